use thiserror::Error;

#[derive(Error, Debug)]
pub enum TailError {
    #[error("Configuration error: {field}: {reason}")]
    Config { field: &'static str, reason: String },

    #[error("HTTP request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server returned non-success status: {0}")]
    Status(reqwest::StatusCode),

    #[error("JSON parsing error: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("Unexpected response format: {0}")]
    Protocol(String),
}

impl TailError {
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        TailError::Config {
            field,
            reason: reason.into(),
        }
    }

    /// Only configuration errors abort the process; everything else is
    /// scoped to a single poll cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TailError::Config { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_field() {
        let err = TailError::config("from_date", "must be ISO8601");
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Configuration error: from_date: must be ISO8601"
        );
    }

    #[test]
    fn protocol_error_is_not_fatal() {
        let err = TailError::Protocol("missing `logs` key".to_string());
        assert!(!err.is_fatal());

        let err = TailError::Status(reqwest::StatusCode::BAD_GATEWAY);
        assert!(!err.is_fatal());
    }
}
