//! Bearer-authenticated REST transport over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use puffer_core::{
    ApiRequest, ApiResponse, ApiTransport, Method, RequestBody, SessionHandle, TransportError,
};
use reqwest::{Client, header::CONTENT_TYPE};
use url::Url;

/// [`ApiTransport`] backed by a reqwest client.
///
/// The bearer token is read from the shared [`SessionHandle`] on every
/// request, so a later login is picked up without rebuilding the transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base: Url,
    session: SessionHandle,
}

impl HttpTransport {
    /// Create a transport for the panel at `base`.
    ///
    /// # Errors
    /// Returns `TransportError::Network` if the HTTP client cannot be built.
    pub fn new(
        base: Url,
        session: SessionHandle,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base,
            session,
        })
    }

    /// Absolute URL for an API path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn http_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let ApiRequest { method, path, body } = request;
        tracing::debug!(?method, %path, "Panel request");

        let mut builder = self.client.request(http_method(method), self.url(&path));
        if let Some(token) = self.session.token() {
            builder = builder.bearer_auth(token);
        }
        builder = match body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Text(text)) => builder.header(CONTENT_TYPE, "text/plain").body(text),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), %path, "Panel rejected request");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(ApiResponse {
            status: status.as_u16(),
            body,
        })
    }
}
