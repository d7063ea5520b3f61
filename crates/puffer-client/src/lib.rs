//! PufferPanel client.
//!
//! Provides:
//! - `PanelClient` - login (with `LoginEvent` notifications), server/template/user listing
//! - `Server` - status, daemon channel, lifecycle commands, console
//! - `FileManager` / `RemoteFile` - file listing, create, edit, delete
//! - `HttpTransport` - bearer-authenticated REST over reqwest
//!
//! ```no_run
//! # async fn run() -> Result<(), puffer_client::ClientError> {
//! let client = puffer_client::PanelClient::from_env()?;
//! client.login().await?;
//! for mut server in client.servers().await? {
//!     server.connect().await?;
//!     println!("{}: {:?}", server.name(), server.stats().await?);
//!     server.disconnect().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod files;
pub mod http;
pub mod server;
pub mod template;
pub mod user;

pub use client::{LoginEvent, PanelClient};
pub use error::{ClientError, Result};
pub use files::{FileManager, RemoteFile};
pub use http::HttpTransport;
pub use server::{Console, Server};
pub use template::Template;
pub use user::User;

pub use puffer_core::{ClientConfig, Credentials, Session, SessionHandle};
pub use puffer_transport::{ChannelError, ChannelOptions, StatusAck, StopOutcome};
