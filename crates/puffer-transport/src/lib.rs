//! Daemon socket layer for the PufferPanel client.
//!
//! Provides:
//! - `Channel` - one duplex connection per server, with reader/writer tasks
//! - `Demultiplexer` - routes inbound frames by `type` to waits and subscribers
//! - `Command` - typed request/response exchanges over the channel
//! - WebSocket transport (feature: websocket)

pub mod channel;
pub mod commands;
pub mod demux;
pub mod error;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use channel::{Channel, ChannelOptions, ChannelState, EventStream};
pub use commands::{
    Command, ConsoleSend, DeleteFile, Kill, ListFiles, Replay, Start, Stat, StatusAck, Stop,
    StopOutcome,
};
pub use demux::{Delivery, Demultiplexer, SubscriptionId, Wait, WaitId};
pub use error::{ChannelError, Result};
pub use protocol::{FileAction, InboundFrame, OutboundFrame, WireMessage, kinds};

#[cfg(feature = "websocket")]
pub use websocket::{AUTH_COOKIE, socket_url};
