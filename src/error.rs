//! Error types for rawecho

use std::io;
use thiserror::Error;

/// Result type for rawecho operations
pub type Result<T> = std::result::Result<T, RawEchoError>;

/// Errors that can occur in rawecho
#[derive(Debug, Error)]
pub enum RawEchoError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No live recording is registered for the request's peer
    #[error("No recording registered for peer {remote_addr}")]
    CorrelationMiss {
        /// Correlation key that was looked up
        remote_addr: String,
    },

    /// Request body could not be read to completion
    #[error("Failed to drain request body: {0}")]
    BodyDrain(String),
}
