//! Core building blocks for the PufferPanel client.
//!
//! This crate provides:
//! - `Session` / `SessionHandle` - Bearer session shared by all facades
//! - `LogBuffer` - Bounded console history + live broadcast
//! - `ClientConfig` - Panel URL, credentials and limits
//! - Resource records and the `ApiTransport` trait

pub mod config;
pub mod log_buffer;
pub mod session;
pub mod traits;
pub mod types;

pub use config::{ClientConfig, ConfigError};
pub use log_buffer::{DEFAULT_LOG_RETENTION, LogBuffer};
pub use session::{Credentials, Session, SessionHandle};
pub use traits::{ApiRequest, ApiResponse, ApiTransport, Method, RequestBody, TransportError};
pub use types::{
    FileEntry, RawFileEntry, ServerInfo, ServerList, ServerStatus, TemplateDetails,
    TemplateSummary, TemplateVariable, UsageStats, UserInfo, VariableType,
};
