use crate::error::TailError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// Bounded FIFO of the most recently rendered lines.
pub struct TailBuffer {
    lines: VecDeque<String>,
    max_lines: usize,
}

impl TailBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(max_lines),
            max_lines,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.max_lines == 0 {
            return;
        }
        while self.lines.len() >= self.max_lines {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Identity keys already emitted. Grows for the lifetime of the session.
#[derive(Debug, Default, Clone)]
pub struct SeenSet {
    keys: HashSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the key was not present before.
    pub fn insert(&mut self, key: String) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Result<Self, TailError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(TailError::config(
                "sort",
                format!("'{}' is not one of asc, desc", other),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a logs API response.
#[derive(Debug, Deserialize)]
pub struct LogsEnvelope {
    /// Records as the server ordered them; each is normalised separately
    pub logs: Vec<Value>,
}

impl LogsEnvelope {
    /// Shape check on an already parsed JSON document.
    pub fn from_document(document: Value) -> Result<Self, TailError> {
        if !document.is_object() {
            return Err(TailError::Protocol("response is not a JSON object".to_string()));
        }
        serde_json::from_value(document).map_err(|e| TailError::Protocol(e.to_string()))
    }
}
