use crate::error::TailError;
use std::fmt;

const EXACT_SUFFIX: &str = "_only";

/// Known request levels, ordered from least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Debug,
}

impl Severity {
    pub const LADDER: [Severity; 4] = [
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Debug => "debug",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::LADDER.into_iter().find(|s| s.as_str() == value)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level selection sent to the server.
///
/// `Cumulative(Error)` asks for info, warning and error; `ExactOnly("error")`
/// asks for error alone. Exact levels are opaque so server-defined values
/// can still be requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelFilter {
    Cumulative(Severity),
    ExactOnly(String),
}

impl Default for LevelFilter {
    fn default() -> Self {
        LevelFilter::Cumulative(Severity::Info)
    }
}

impl LevelFilter {
    pub fn parse(raw: &str) -> Result<Self, TailError> {
        let value = raw.trim().to_ascii_lowercase();

        if let Some(level) = value.strip_suffix(EXACT_SUFFIX) {
            if level.is_empty() {
                return Err(TailError::config(
                    "level",
                    format!("'{}' does not name a level before '{}'", raw, EXACT_SUFFIX),
                ));
            }
            return Ok(LevelFilter::ExactOnly(level.to_string()));
        }

        Severity::parse(&value)
            .map(LevelFilter::Cumulative)
            .ok_or_else(|| {
                TailError::config(
                    "level",
                    format!(
                        "unknown level '{}' (expected info, warning, error, debug, or <level>{})",
                        raw, EXACT_SUFFIX
                    ),
                )
            })
    }

    /// The candidate set sent as the `level` query parameter.
    pub fn candidates(&self) -> Vec<&str> {
        match self {
            LevelFilter::Cumulative(max) => Severity::LADDER
                .iter()
                .filter(|s| **s <= *max)
                .map(|s| s.as_str())
                .collect(),
            LevelFilter::ExactOnly(level) => vec![level.as_str()],
        }
    }

    pub fn query_value(&self) -> String {
        self.candidates().join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cumulative_levels_include_lower_ones() {
        assert_eq!(LevelFilter::parse("info").unwrap().query_value(), "info");
        assert_eq!(
            LevelFilter::parse("warning").unwrap().query_value(),
            "info,warning"
        );
        assert_eq!(
            LevelFilter::parse("error").unwrap().query_value(),
            "info,warning,error"
        );
        assert_eq!(
            LevelFilter::parse("debug").unwrap().query_value(),
            "info,warning,error,debug"
        );
    }

    #[test]
    fn only_suffix_selects_single_level() {
        let filter = LevelFilter::parse("error_only").unwrap();
        assert_eq!(filter, LevelFilter::ExactOnly("error".to_string()));
        assert_eq!(filter.candidates(), vec!["error"]);

        assert_eq!(
            LevelFilter::parse("warning_only").unwrap().query_value(),
            "warning"
        );
    }

    #[test]
    fn exact_level_may_be_server_defined() {
        let filter = LevelFilter::parse("audit_only").unwrap();
        assert_eq!(filter.query_value(), "audit");
    }

    #[test]
    fn default_is_info() {
        assert_eq!(LevelFilter::default().query_value(), "info");
    }

    #[test]
    fn input_is_normalised() {
        assert_eq!(
            LevelFilter::parse(" Warning ").unwrap(),
            LevelFilter::Cumulative(Severity::Warning)
        );
    }

    #[test]
    fn unknown_levels_are_rejected() {
        let err = LevelFilter::parse("verbose").unwrap_err();
        assert!(matches!(err, TailError::Config { field: "level", .. }));

        let err = LevelFilter::parse("_only").unwrap_err();
        assert!(matches!(err, TailError::Config { field: "level", .. }));
    }
}
