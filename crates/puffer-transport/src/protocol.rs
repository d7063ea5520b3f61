//! Wire protocol for the daemon socket.
//!
//! Both directions carry one JSON object per text frame. Inbound frames are
//! `{ "type": ..., "data": {...} }`; there is no correlation ID, so the
//! `type` tag is the only demultiplexing key.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Frame `type` tags used by the daemon.
pub mod kinds {
    pub const STATUS: &str = "status";
    pub const STAT: &str = "stat";
    pub const CONSOLE: &str = "console";
    pub const LOG: &str = "log";
    pub const FILE: &str = "file";
}

/// Message from the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Demultiplexing key.
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload; shape depends on `kind`.
    #[serde(default)]
    pub data: Value,
}

impl InboundFrame {
    /// Create a frame.
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Whether this frame carries console output.
    #[must_use]
    pub fn is_console_output(&self) -> bool {
        self.kind == kinds::CONSOLE || self.kind == kinds::LOG
    }

    /// Console lines from `data.logs`; non-string entries are skipped.
    #[must_use]
    pub fn logs(&self) -> Vec<String> {
        self.data
            .get("logs")
            .and_then(Value::as_array)
            .map(|logs| {
                logs.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Console chunk joined and trimmed, as published on the `log` event.
    #[must_use]
    pub fn log_text(&self) -> String {
        self.logs().concat().trim().to_string()
    }

    /// Decode `data` into a typed payload.
    ///
    /// # Errors
    /// Returns error if `data` does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// File operation verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Get,
    Delete,
}

/// Message to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Start the server process.
    Start,
    /// Stop the server process gracefully.
    Stop,
    /// Kill the server process.
    Kill,
    /// Request a usage sample.
    Stat,
    /// Replay buffered console history.
    Replay,
    /// Write a line to the server console.
    Console { command: String },
    /// File operation.
    File {
        action: FileAction,
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        edit: Option<bool>,
    },
}

impl OutboundFrame {
    /// Console input frame.
    #[must_use]
    pub fn console(command: impl Into<String>) -> Self {
        Self::Console {
            command: command.into(),
        }
    }

    /// Directory listing frame.
    #[must_use]
    pub fn list_files(path: impl Into<String>) -> Self {
        Self::File {
            action: FileAction::Get,
            path: path.into(),
            edit: Some(false),
        }
    }

    /// File deletion frame.
    #[must_use]
    pub fn delete_file(path: impl Into<String>) -> Self {
        Self::File {
            action: FileAction::Delete,
            path: path.into(),
            edit: None,
        }
    }
}

/// Transport-level message, independent of the socket library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// UTF-8 text frame.
    Text(String),
    /// Close handshake.
    Close,
}
