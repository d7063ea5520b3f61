//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{log_buffer::DEFAULT_LOG_RETENTION, session::Credentials};

/// Default REST request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("Invalid panel URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Everything needed to build a panel client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the panel (`http` or `https`).
    pub panel_url: Url,
    /// Login credentials.
    pub credentials: Credentials,
    /// Console lines retained per daemon connection.
    #[serde(default = "default_log_retention")]
    pub log_retention: usize,
    /// Per-request timeout for REST calls.
    #[serde(default = "default_request_timeout", with = "secs")]
    pub request_timeout: Duration,
}

const fn default_log_retention() -> usize {
    DEFAULT_LOG_RETENTION
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

impl ClientConfig {
    /// Create a configuration with default retention and timeout.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidUrl` if `panel_url` is not an http(s) URL.
    pub fn new(panel_url: &str, credentials: Credentials) -> Result<Self, ConfigError> {
        Ok(Self {
            panel_url: parse_panel_url(panel_url)?,
            credentials,
            log_retention: DEFAULT_LOG_RETENTION,
            request_timeout: default_request_timeout(),
        })
    }

    /// Set the console retention.
    #[must_use]
    pub const fn with_log_retention(mut self, lines: usize) -> Self {
        self.log_retention = lines;
        self
    }

    /// Set the REST timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// - `PUFFER_URL` (required): panel base URL
    /// - `PUFFER_EMAIL` (required): account email
    /// - `PUFFER_PASSWORD` (required): account password
    /// - `PUFFER_LOG_RETENTION` (optional): console lines kept per connection
    /// - `PUFFER_REQUEST_TIMEOUT_SECS` (optional): REST timeout in seconds
    ///
    /// # Errors
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a custom variable source.
    ///
    /// # Errors
    /// Returns an error if a required variable is missing or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| lookup(key).ok_or(ConfigError::Missing(key));

        let credentials = Credentials::new(required("PUFFER_EMAIL")?, required("PUFFER_PASSWORD")?);
        let mut config = Self::new(&required("PUFFER_URL")?, credentials)?;

        if let Some(value) = lookup("PUFFER_LOG_RETENTION") {
            let lines = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PUFFER_LOG_RETENTION",
                value: value.clone(),
            })?;
            config = config.with_log_retention(lines);
        }

        if let Some(value) = lookup("PUFFER_REQUEST_TIMEOUT_SECS") {
            let secs = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PUFFER_REQUEST_TIMEOUT_SECS",
                value: value.clone(),
            })?;
            config = config.with_request_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }
}

/// Parse and validate a panel base URL.
///
/// # Errors
/// Returns `ConfigError::InvalidUrl` for unparsable or non-http(s) URLs.
pub fn parse_panel_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("PUFFER_URL", "https://panel.example.com"),
            ("PUFFER_EMAIL", "admin@example.com"),
            ("PUFFER_PASSWORD", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.panel_url.as_str(), "https://panel.example.com/");
        assert_eq!(config.credentials.email, "admin@example.com");
        assert_eq!(config.log_retention, DEFAULT_LOG_RETENTION);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("PUFFER_URL", "http://localhost:8080"),
            ("PUFFER_EMAIL", "a@b.c"),
            ("PUFFER_PASSWORD", "pw"),
            ("PUFFER_LOG_RETENTION", "50"),
            ("PUFFER_REQUEST_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.log_retention, 50);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_variable() {
        let err =
            ClientConfig::from_lookup(lookup_from(&[("PUFFER_URL", "http://x")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PUFFER_EMAIL")));
    }

    #[test]
    fn test_invalid_retention() {
        let err = ClientConfig::from_lookup(lookup_from(&[
            ("PUFFER_URL", "http://x"),
            ("PUFFER_EMAIL", "a"),
            ("PUFFER_PASSWORD", "b"),
            ("PUFFER_LOG_RETENTION", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "PUFFER_LOG_RETENTION",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        assert!(parse_panel_url("ftp://panel").is_err());
        assert!(parse_panel_url("not a url").is_err());
        assert!(parse_panel_url("https://panel/sub").is_ok());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"panel_url":"http://localhost:8080","credentials":{"email":"a","password":"b"},"request_timeout":12}"#,
        )
        .unwrap();
        assert_eq!(config.log_retention, DEFAULT_LOG_RETENTION);
        assert_eq!(config.request_timeout, Duration::from_secs(12));
    }
}
