//! Seam between the resource facades and the authenticated REST channel.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// HTTP method used by the panel API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// Body of an outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// JSON document.
    Json(Value),
    /// Raw text, sent as-is (file contents).
    Text(String),
}

/// A request relative to the panel base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path beginning with `/`.
    pub path: String,
    pub body: Option<RequestBody>,
}

impl ApiRequest {
    /// `GET path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    /// `POST path` with a JSON body.
    #[must_use]
    pub fn post_json(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(RequestBody::Json(body)),
        }
    }

    /// `PUT path` with a raw text body.
    #[must_use]
    pub fn put_text(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            body: Some(RequestBody::Text(body.into())),
        }
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    /// Decode the body as JSON.
    ///
    /// # Errors
    /// Returns `TransportError::Decode` if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_str(&self.body).map_err(TransportError::Decode)
    }
}

/// REST transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(String),
    /// The panel answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),
}

impl TransportError {
    /// HTTP status, if the panel answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the panel rejected the credentials or token.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}

/// Authenticated request/response channel to the panel.
///
/// Implementations attach the current bearer token to every request and
/// turn non-2xx responses into [`TransportError::Status`].
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Perform one request.
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}
