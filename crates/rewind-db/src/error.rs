//! Error types for the durable history mirror.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`fred`] and `serde_json` errors with additional context about which
//! operation failed.

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The key holds a value that is not a sorted set.
    #[error("Key {key} holds an incompatible type")]
    TypeConflict {
        /// The offending key.
        key: String,
    },

    /// The store did not answer within the allotted time.
    #[error("Store call timed out after {timeout_ms}ms")]
    Timeout {
        /// The bound that was exceeded.
        timeout_ms: u64,
    },

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
