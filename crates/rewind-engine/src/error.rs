//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure that stops the process at startup.
//! Everything after startup (store writes, client sessions) degrades and
//! logs instead of failing.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: rewind_core::config::ConfigError,
    },

    /// The position history could not be created.
    #[error("history error: {source}")]
    History {
        /// The underlying history error.
        #[from]
        source: rewind_core::history::HistoryError,
    },

    /// The server failed to bind or serve.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: rewind_server::ServerError,
    },

    /// Logging could not be initialized.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the logging failure.
        message: String,
    },
}
