//! Error types for the daily quiz bot
//!
//! This module provides error handling using thiserror for structured error
//! definitions and anyhow for propagation at the binary edge.

use thiserror::Error;

/// Main error type for quiz bot operations
#[derive(Error, Debug)]
pub enum QuizError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// LLM API request failed
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed preferred delivery time
    #[error("Invalid time '{0}': expected HH:MM between 00:00 and 23:59")]
    InvalidTime(String),

    /// Chat platform rejected or failed a request
    #[error("Transport error: {0}")]
    Transport(String),

    /// The recipient blocked the bot or the chat no longer exists
    #[error("Recipient {0} is unreachable")]
    RecipientBlocked(i64),

    /// User not registered
    #[error("User not found: {0}")]
    UserNotFound(i64),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for quiz bot operations
pub type Result<T> = std::result::Result<T, QuizError>;

/// Convert anyhow::Error to QuizError, keeping the context chain
impl From<anyhow::Error> for QuizError {
    fn from(err: anyhow::Error) -> Self {
        QuizError::Other(format!("{:#}", err))
    }
}

impl From<rusqlite::Error> for QuizError {
    fn from(err: rusqlite::Error) -> Self {
        QuizError::Database(err.to_string())
    }
}

impl QuizError {
    /// Whether retrying the same delivery later cannot succeed
    pub fn is_permanent_delivery_failure(&self) -> bool {
        matches!(self, QuizError::RecipientBlocked(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuizError::UserNotFound(42);
        assert_eq!(err.to_string(), "User not found: 42");

        let err = QuizError::InvalidTime("25:00".to_string());
        assert!(err.to_string().contains("25:00"));
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ not json");
        assert!(json_err.is_err());

        let quiz_err: QuizError = json_err.unwrap_err().into();
        assert!(matches!(quiz_err, QuizError::Serialization(_)));
    }

    #[test]
    fn test_anyhow_context_is_kept() {
        use anyhow::Context;

        let result: std::result::Result<(), QuizError> =
            Err(QuizError::InvalidTime("7pm".to_string()));
        let err: QuizError = result.context("Failed to read settings").unwrap_err().into();

        match err {
            QuizError::Other(msg) => {
                assert!(msg.starts_with("Failed to read settings: "));
                assert!(msg.contains("7pm"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_permanent_delivery_failure() {
        assert!(QuizError::RecipientBlocked(7).is_permanent_delivery_failure());
        assert!(!QuizError::Transport("timeout".into()).is_permanent_delivery_failure());
    }
}
