//! Channel error type.

use thiserror::Error;

/// Daemon channel error.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The connection was closed, either by `disconnect` or by the remote.
    #[error("Connection closed")]
    Closed,
    /// The connection could not be opened.
    #[error("Connect failed: {0}")]
    Connect(String),
    /// The underlying transport failed mid-session.
    #[error("Transport error: {0}")]
    Transport(String),
    /// A frame could not be encoded or a payload could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// The panel URL cannot be turned into a socket URL.
    #[error("Invalid socket URL: {0}")]
    InvalidUrl(String),
}

impl ChannelError {
    /// Whether this error means the channel is gone.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Result alias for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
