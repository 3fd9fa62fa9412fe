use serde_json::Value;

const KEY_SEPARATOR: char = '|';

/// A single log record returned by the logs API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// ISO 8601 timestamp as reported by the server, empty if omitted
    pub timestamp: String,
    /// Opaque severity string
    pub level: String,
    /// Message text, never empty
    pub message: String,
    /// Service the record belongs to, when known
    pub service_hint: Option<String>,
}

impl LogEntry {
    pub fn new(
        timestamp: impl Into<String>,
        level: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            level: level.into(),
            message: message.into(),
            service_hint: None,
        }
    }

    /// Normalise one element of the `logs` array.
    ///
    /// A record without a `message` falls back to its compact JSON text so
    /// the rendered line is never blank.
    pub fn from_record(record: &Value, service: Option<&str>) -> Self {
        let timestamp = text_field(record, "date")
            .or_else(|| text_field(record, "timestamp"))
            .unwrap_or_default();
        let level = text_field(record, "level").unwrap_or_default();
        let message = text_field(record, "message")
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| match record {
                Value::String(s) if !s.is_empty() => s.clone(),
                other => other.to_string(),
            });
        let service_hint = text_field(record, "service").or_else(|| service.map(str::to_string));

        Self {
            timestamp,
            level,
            message,
            service_hint,
        }
    }

    /// Identity used for de-duplication across polls.
    ///
    /// Two distinct records sharing timestamp, level and message collapse
    /// into one.
    pub fn identity_key(&self) -> String {
        let mut key = String::with_capacity(
            self.timestamp.len() + self.level.len() + self.message.len() + 2,
        );
        key.push_str(&self.timestamp);
        key.push(KEY_SEPARATOR);
        key.push_str(&self.level);
        key.push(KEY_SEPARATOR);
        key.push_str(&self.message);
        key
    }

    /// Plain `timestamp<TAB>level<TAB>message` line.
    pub fn render(&self) -> String {
        format!("{}\t{:<5}\t{}", self.timestamp, self.level, self.message)
    }
}

fn text_field(record: &Value, name: &str) -> Option<String> {
    match record.get(name)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
