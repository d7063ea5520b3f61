//! Login credentials and the shared session cell.

use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};

/// Email/password pair used to log into the panel.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Account email address.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Create a new credential pair.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An authenticated panel session.
///
/// The token is opaque; expiry is tracked by the panel only.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token returned by `/auth/login`.
    #[serde(rename = "session")]
    pub token: String,
    /// Scopes granted to this session.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Session {
    /// Create a session from a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            token: token.into(),
            scopes,
        }
    }

    /// Whether the panel granted `scope` to this session.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Shared cell holding the current session.
///
/// Every facade spawned from one client holds a clone of the same handle,
/// so a later login is observed by all of them.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionHandle {
    /// Create an empty (logged out) handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle that already holds `session`.
    #[must_use]
    pub fn with_session(session: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(session))),
        }
    }

    /// Replace the stored session.
    pub fn replace(&self, session: Session) {
        let previous = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(session);
        if previous.is_some() {
            tracing::debug!("Session token replaced");
        }
    }

    /// Forget the stored session.
    pub fn clear(&self) {
        if self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            tracing::debug!("Session cleared");
        }
    }

    /// Snapshot of the current session.
    #[must_use]
    pub fn get(&self) -> Option<Session> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current bearer token, if logged in.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.token.clone())
    }

    /// Whether a session is present.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_response_shape() {
        let session: Session =
            serde_json::from_str(r#"{"session":"abc","scopes":["servers.view"]}"#).unwrap();
        assert_eq!(session.token, "abc");
        assert!(session.has_scope("servers.view"));
        assert!(!session.has_scope("servers.admin"));
    }

    #[test]
    fn test_missing_scopes_default_to_empty() {
        let session: Session = serde_json::from_str(r#"{"session":"abc"}"#).unwrap();
        assert!(session.scopes.is_empty());
    }

    #[test]
    fn test_handle_clones_observe_replacement() {
        let handle = SessionHandle::new();
        let facade_view = handle.clone();
        assert!(!facade_view.is_logged_in());

        handle.replace(Session::new("first", vec![]));
        assert_eq!(facade_view.token().as_deref(), Some("first"));

        handle.replace(Session::new("second", vec![]));
        assert_eq!(facade_view.token().as_deref(), Some("second"));

        handle.clear();
        assert!(facade_view.token().is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::new("a@b.c", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));

        let session = Session::new("secret-token", vec![]);
        assert!(!format!("{session:?}").contains("secret-token"));
    }
}
