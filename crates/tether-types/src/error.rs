//! Shared error types for the Tether system.

use thiserror::Error;

/// Top-level error type for the Tether system.
#[derive(Error, Debug)]
pub enum TetherError {
    /// A configuration value was rejected.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A tool was called with arguments it cannot use.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The requested tool does not exist.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// A message could not be handed to peers.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Alias for Result with TetherError.
pub type TetherResult<T> = Result<T, TetherError>;
