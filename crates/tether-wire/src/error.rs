//! Errors from the wire protocol layer.

use thiserror::Error;

/// Errors from the wire protocol layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Peer channel closed")]
    ChannelClosed,
    #[error("Peer outbound queue full")]
    QueueFull,
}
