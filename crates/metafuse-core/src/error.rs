//! Error types for metafuse.

use thiserror::Error;

/// Main error type for metafuse operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Rule evaluation or validation failed
    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Metadata store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection lost, request timed out, or the server is unreachable.
    /// The event loop pauses and retries; API handlers surface a 5xx.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("decode error for key {key}: {reason}")]
    Decode { key: String, reason: String },
}

/// Rule model errors.
///
/// Most rule problems are soft failures handled during evaluation (the rule
/// or condition is skipped). These variants surface only through the
/// rule-management API.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("invalid template: {0}")]
    Template(String),

    #[error("invalid condition: {0}")]
    Condition(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Result type alias for metafuse operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_transport_display() {
        let err = StoreError::Transport("connection reset".to_string());
        assert_eq!(err.to_string(), "transport error: connection reset");
    }

    #[test]
    fn test_store_error_decode_display() {
        let err = StoreError::Decode {
            key: "file:abc/size".to_string(),
            reason: "not an integer".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "decode error for key file:abc/size: not an integer"
        );
    }

    #[test]
    fn test_rule_error_template_display() {
        let err = RuleError::Template("unclosed brace".to_string());
        assert_eq!(err.to_string(), "invalid template: unclosed brace");
    }

    #[test]
    fn test_error_from_store_error() {
        let store_err = StoreError::Transport("timeout".to_string());
        let err: Error = store_err.into();
        assert!(matches!(err, Error::Store(_)));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_error_from_rule_error() {
        let rule_err = RuleError::Validation("empty template".to_string());
        let err: Error = rule_err.into();
        assert!(matches!(err, Error::Rule(_)));
        assert!(err.to_string().contains("empty template"));
    }

    #[test]
    fn test_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_config_display() {
        let err = Error::Config("storeUrl is empty".to_string());
        assert_eq!(err.to_string(), "config error: storeUrl is empty");
    }

    #[test]
    fn test_result_type_alias() {
        fn ok_fn() -> Result<u32> {
            Ok(7)
        }

        fn err_fn() -> Result<u32> {
            Err(Error::Other("boom".to_string()))
        }

        assert!(ok_fn().is_ok());
        assert!(err_fn().is_err());
    }
}
