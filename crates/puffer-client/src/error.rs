//! Client error type.

use puffer_core::{ConfigError, TransportError};
use puffer_transport::ChannelError;
use thiserror::Error;

/// PufferPanel client error.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A REST call failed or returned a non-success status.
    #[error("Request failed: {0}")]
    Transport(#[from] TransportError),
    /// The daemon channel failed.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    /// An operation needs a session and `login` has not succeeded.
    #[error("Not logged in")]
    NotLoggedIn,
    /// An operation needs the server's channel and `connect` was not called.
    #[error("Server {0} is not connected")]
    NotConnected(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
}

impl ClientError {
    /// HTTP status, if the panel rejected the request.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status(),
            _ => None,
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_passthrough() {
        let err: ClientError = TransportError::Status {
            status: 401,
            body: "unauthorized".to_string(),
        }
        .into();
        assert_eq!(err.status(), Some(401));
        assert_eq!(ClientError::NotLoggedIn.status(), None);
    }

    #[test]
    fn test_channel_conversion() {
        let err: ClientError = ChannelError::Closed.into();
        assert!(matches!(err, ClientError::Channel(ChannelError::Closed)));
        assert_eq!(
            ClientError::NotConnected("abc".to_string()).to_string(),
            "Server abc is not connected"
        );
    }
}
