//! Error types shared by the key store, the event registry and the dispatcher.

use thiserror::Error;

/// Errors raised by the trust store and the repositories.
#[derive(Error, Debug)]
pub enum TrustError {
    /// Missing or malformed startup configuration. Fatal for the process.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed PEM text or serialized snapshot data.
    #[error("Format error: {0}")]
    Format(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Key already exists: {0}")]
    KeyExists(String),
}

impl From<serde_json::Error> for TrustError {
    fn from(e: serde_json::Error) -> Self {
        TrustError::Format(e.to_string())
    }
}

impl From<rsa::Error> for TrustError {
    fn from(e: rsa::Error) -> Self {
        TrustError::Crypto(e.to_string())
    }
}

/// Result type for trust store operations
pub type Result<T> = std::result::Result<T, TrustError>;

/// Errors returned by a job bound to an event.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job failed: {0}")]
    Failed(String),

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with status {code:?}")]
    Exit { program: String, code: Option<i32> },

    #[error("Fingerprint mismatch for {item}: expected {expected}, got {actual}")]
    Fingerprint {
        item: String,
        expected: String,
        actual: String,
    },
}
