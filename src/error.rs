//! Error types for replikv

use thiserror::Error;

/// Result type alias for replikv operations
pub type Result<T> = std::result::Result<T, Error>;

/// replikv error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Store errors
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    // Lifecycle errors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    // Replication errors
    #[error("Replication error: {0}")]
    Replication(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    #[error("Line protocol error: {0}")]
    Protocol(#[from] tokio_util::codec::LinesCodecError),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_)
                | Error::ConnectionFailed { .. }
                | Error::ConnectionTimeout(_)
                | Error::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(Error::ConnectionTimeout("10.0.0.1:9090".to_string()).is_retryable());
        assert!(Error::ConnectionFailed {
            address: "10.0.0.1:9090".to_string(),
            reason: "refused".to_string(),
        }
        .is_retryable());
        assert!(Error::Network("checksum mismatch".to_string()).is_retryable());
        assert!(!Error::KeyNotFound("a".to_string()).is_retryable());
        assert!(!Error::InvalidState("stopped".to_string()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::KeyNotFound("user:1".to_string());
        assert_eq!(err.to_string(), "Key not found: user:1");

        let err = Error::ConnectionFailed {
            address: "127.0.0.1:9090".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Connection failed to 127.0.0.1:9090: connection refused"
        );
    }
}
