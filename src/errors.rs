use thiserror::Error;

/// Error types for the style engine.
///
/// Missing statistics are never errors: every lookup into the pattern store has a
/// neutral default. These variants cover the cases that callers must handle.
#[derive(Debug, Error)]
pub enum ChessEngineError {
    /// Invalid chess position (bad FEN, unsupported setup)
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// A move token that does not parse or is not legal in the current position
    #[error("Illegal move '{token}' in position {fen}")]
    IllegalMove { token: String, fen: String },

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Pattern store or config document could not be (de)serialized
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Pattern store written by an incompatible format version
    #[error("Incompatible pattern store version '{found}' (expected major version of '{expected}')")]
    IncompatibleStore { found: String, expected: String },

    /// A single game record in the corpus could not be used
    #[error("Malformed game record #{game}: {reason}")]
    CorpusRecord { game: usize, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Validation error with context
    #[error("Validation failed for field '{field}': got '{value}', expected '{expected}'")]
    ValidationError {
        field: String,
        value: String,
        expected: String,
    },

    /// The side to move has no legal move (checkmate or stalemate)
    #[error("No legal move available")]
    NoLegalMove,

    /// Scoring panicked or produced no usable ranking
    #[error("Move scoring failed: {0}")]
    ScoringFailed(String),
}

/// Convenience type alias
pub type Result<T> = std::result::Result<T, ChessEngineError>;

impl ChessEngineError {
    /// Whether the engine can keep answering the host after this error.
    /// Bad configuration values are the only fatal case.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ChessEngineError::ConfigurationError(_) | ChessEngineError::ValidationError { .. }
        )
    }
}

/// Build a `ChessEngineError::ValidationError` from displayable parts.
#[macro_export]
macro_rules! validation_error {
    ($field:expr, $value:expr, $expected:expr) => {
        $crate::errors::ChessEngineError::ValidationError {
            field: $field.to_string(),
            value: $value.to_string(),
            expected: $expected.to_string(),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ChessEngineError::InvalidPosition("missing king".to_string());
        assert_eq!(error.to_string(), "Invalid position: missing king");

        let error = ChessEngineError::IllegalMove {
            token: "e2e5".to_string(),
            fen: "startpos".to_string(),
        };
        assert!(error.to_string().contains("e2e5"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "patterns.json");
        let error: ChessEngineError = io_error.into();
        assert!(matches!(error, ChessEngineError::IoError(_)));
        assert!(error.is_recoverable());
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error: ChessEngineError = json_error.into();
        assert!(matches!(error, ChessEngineError::Serialization(_)));
    }

    #[test]
    fn test_validation_error_macro() {
        let error = validation_error!("jitter", 0.7, "0.0..=0.2");
        match error {
            ChessEngineError::ValidationError {
                field,
                value,
                expected,
            } => {
                assert_eq!(field, "jitter");
                assert_eq!(value, "0.7");
                assert_eq!(expected, "0.0..=0.2");
            }
            _ => panic!("Expected ValidationError"),
        }
        assert!(!validation_error!("top_k", 0, ">= 1").is_recoverable());
    }

    #[test]
    fn test_configuration_error_not_recoverable() {
        let error = ChessEngineError::ConfigurationError("bad".to_string());
        assert!(!error.is_recoverable());
        assert_eq!(error.to_string(), "Configuration error: bad");
    }
}
