//! Error types for the alpha wallet tracker

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the alpha wallet tracker
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC timeout after {0}ms")]
    RpcTimeout(u64),

    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    // Price discovery errors
    #[error("Price lookup failed: {0}")]
    Price(String),

    // Notification errors
    #[error("Notification failed: {0}")]
    Notify(String),

    // Wallet list errors
    #[error("Wallet list persistence failed: {0}")]
    Persistence(String),

    #[error("Validation failed: {errors} error(s), {warnings} warning(s)")]
    Validation { errors: usize, warnings: usize },

    #[error("Deploy command failed: {0}")]
    Deploy(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is a transient external-call failure.
    ///
    /// Batch passes log these and move on to the next wallet.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_)
                | Error::RpcTimeout(_)
                | Error::RpcConnection(_)
                | Error::Price(_)
                | Error::Notify(_)
        )
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            Error::RpcConnection(e.to_string())
        } else {
            Error::Rpc(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Rpc("boom".into()).is_transient());
        assert!(Error::RpcTimeout(10_000).is_transient());
        assert!(Error::Price("no pairs".into()).is_transient());
        assert!(!Error::Persistence("disk full".into()).is_transient());
        assert!(!Error::Config("bad".into()).is_transient());
    }

    #[test]
    fn test_validation_message() {
        let err = Error::Validation {
            errors: 2,
            warnings: 1,
        };
        assert_eq!(err.to_string(), "Validation failed: 2 error(s), 1 warning(s)");
    }
}
