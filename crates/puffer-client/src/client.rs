//! Top-level panel client.

use std::{fmt, sync::Arc};

use puffer_core::{
    ApiRequest, ApiTransport, ClientConfig, Credentials, ServerList, Session, SessionHandle,
    TemplateSummary, UserInfo,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::broadcast;
use url::Url;

use crate::{
    error::{ClientError, Result},
    http::HttpTransport,
    server::Server,
    template::Template,
    user::User,
};

/// State shared by every facade created from one client.
#[derive(Clone)]
pub(crate) struct Context {
    pub(crate) api: Arc<dyn ApiTransport>,
    pub(crate) session: SessionHandle,
    pub(crate) panel_url: Url,
    pub(crate) log_retention: usize,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("panel_url", &self.panel_url.as_str())
            .field("logged_in", &self.session.is_logged_in())
            .finish_non_exhaustive()
    }
}

impl Context {
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Ok(self.api.request(ApiRequest::get(path)).await?.json()?)
    }

    pub(crate) async fn get_text(&self, path: &str) -> Result<String> {
        Ok(self.api.request(ApiRequest::get(path)).await?.body)
    }

    pub(crate) async fn put_text(&self, path: &str, body: impl Into<String>) -> Result<()> {
        self.api.request(ApiRequest::put_text(path, body)).await?;
        Ok(())
    }
}

/// Login notification capacity; slow receivers skip lagged events.
const LOGIN_EVENT_CAPACITY: usize = 16;

/// Published after every successful [`PanelClient::login`].
#[derive(Debug, Clone)]
pub struct LoginEvent {
    pub credentials: Credentials,
    pub session: Session,
}

/// Entry point: logs in and hands out resource facades.
///
/// Every facade shares this client's [`SessionHandle`], so a later
/// [`PanelClient::login`] is visible to facades created earlier.
#[derive(Debug)]
pub struct PanelClient {
    config: ClientConfig,
    ctx: Context,
    logins: broadcast::Sender<LoginEvent>,
}

impl PanelClient {
    /// Create a client that talks to the panel over HTTP.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let session = SessionHandle::new();
        let http = HttpTransport::new(
            config.panel_url.clone(),
            session.clone(),
            config.request_timeout,
        )?;
        Ok(Self::with_transport(config, session, Arc::new(http)))
    }

    /// Create a client from `PUFFER_*` environment variables.
    ///
    /// # Errors
    /// Returns `ClientError::Config` for missing or invalid variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Create a client over a custom transport.
    ///
    /// `session` must be the handle the transport reads its token from.
    #[must_use]
    pub fn with_transport(
        config: ClientConfig,
        session: SessionHandle,
        api: Arc<dyn ApiTransport>,
    ) -> Self {
        let ctx = Context {
            api,
            session,
            panel_url: config.panel_url.clone(),
            log_retention: config.log_retention,
        };
        let (logins, _) = broadcast::channel(LOGIN_EVENT_CAPACITY);
        Self {
            config,
            ctx,
            logins,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Session cell shared with every facade.
    #[must_use]
    pub const fn session(&self) -> &SessionHandle {
        &self.ctx.session
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.ctx.session.is_logged_in()
    }

    /// Receiver for logins made after this call.
    #[must_use]
    pub fn login_events(&self) -> broadcast::Receiver<LoginEvent> {
        self.logins.subscribe()
    }

    /// Log in with the configured credentials and store the session.
    ///
    /// # Errors
    /// Returns `ClientError::Transport` if the panel rejects the credentials.
    pub async fn login(&self) -> Result<Session> {
        let credentials = &self.config.credentials;
        let body = json!({
            "email": credentials.email,
            "password": credentials.password,
        });
        let session: Session = self
            .ctx
            .api
            .request(ApiRequest::post_json("/auth/login", body))
            .await?
            .json()?;

        self.ctx.session.replace(session.clone());
        tracing::info!(
            email = %credentials.email,
            scopes = session.scopes.len(),
            "Logged in to panel"
        );
        // No receivers is fine.
        let _ = self.logins.send(LoginEvent {
            credentials: credentials.clone(),
            session: session.clone(),
        });
        Ok(session)
    }

    /// Forget the stored session.
    pub fn logout(&self) {
        self.ctx.session.clear();
    }

    fn require_login(&self) -> Result<()> {
        if self.is_logged_in() {
            Ok(())
        } else {
            Err(ClientError::NotLoggedIn)
        }
    }

    /// Servers visible to the logged-in user.
    ///
    /// # Errors
    /// Returns `ClientError::NotLoggedIn` before login, or the REST error.
    pub async fn servers(&self) -> Result<Vec<Server>> {
        self.require_login()?;
        let list: ServerList = self.ctx.get_json("/api/servers").await?;
        Ok(list
            .servers
            .into_iter()
            .map(|info| Server::new(info, self.ctx.clone()))
            .collect())
    }

    /// Server templates known to the panel.
    ///
    /// # Errors
    /// Returns `ClientError::NotLoggedIn` before login, or the REST error.
    pub async fn templates(&self) -> Result<Vec<Template>> {
        self.require_login()?;
        let list: Vec<TemplateSummary> = self.ctx.get_json("/api/templates").await?;
        Ok(list
            .into_iter()
            .map(|summary| Template::new(summary, self.ctx.clone()))
            .collect())
    }

    /// The user the session belongs to.
    ///
    /// # Errors
    /// Returns `ClientError::NotLoggedIn` before login, or the REST error.
    pub async fn who_am_i(&self) -> Result<User> {
        self.require_login()?;
        let info: UserInfo = self.ctx.get_json("/api/self").await?;
        Ok(User::new(info, self.ctx.clone()))
    }
}


#[cfg(test)]
mod tests {
    use puffer_core::{Method, RequestBody};

    use super::{testing::*, *};

    #[tokio::test]
    async fn test_login_stores_session() {
        let api = Arc::new(FakeApi::default());
        api.route(
            Method::Post,
            "/auth/login",
            200,
            r#"{"session":"abc","scopes":["servers.view","login"]}"#,
        );
        let client = client(&api);
        assert!(!client.is_logged_in());

        let session = client.login().await.unwrap();
        assert_eq!(session.token, "abc");
        assert!(session.has_scope("servers.view"));
        assert_eq!(client.session().token().as_deref(), Some("abc"));

        let sent = &api.requests()[0];
        assert_eq!(
            sent.body,
            Some(RequestBody::Json(serde_json::json!({
                "email": "admin@example.com",
                "password": "hunter2",
            })))
        );
    }

    #[tokio::test]
    async fn test_login_failure_keeps_logged_out() {
        let api = Arc::new(FakeApi::default());
        api.route(Method::Post, "/auth/login", 401, "bad credentials");
        let client = client(&api);
        let mut logins = client.login_events();

        let err = client.login().await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(!client.is_logged_in());
        assert!(logins.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_login_publishes_event() {
        let api = Arc::new(FakeApi::default());
        api.route(Method::Post, "/auth/login", 200, r#"{"session":"abc","scopes":[]}"#);
        let client = client(&api);
        let mut logins = client.login_events();

        client.login().await.unwrap();
        client.login().await.unwrap();

        for _ in 0..2 {
            let event = logins.recv().await.unwrap();
            assert_eq!(event.credentials.email, "admin@example.com");
            assert_eq!(event.session.token, "abc");
        }
        assert!(logins.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_resources_require_login() {
        let api = Arc::new(FakeApi::default());
        let client = client(&api);
        assert!(matches!(client.servers().await, Err(ClientError::NotLoggedIn)));
        assert!(matches!(client.templates().await, Err(ClientError::NotLoggedIn)));
        assert!(matches!(client.who_am_i().await, Err(ClientError::NotLoggedIn)));
        assert!(api.requests().is_empty());
    }

    #[tokio::test]
    async fn test_servers_and_templates() {
        let api = Arc::new(FakeApi::default());
        api.route(
            Method::Get,
            "/api/servers",
            200,
            r#"{"servers":[{"id":"a1b2","name":"Survival","node":{"id":1,"name":"local"}}]}"#,
        );
        api.route(
            Method::Get,
            "/api/templates",
            200,
            r#"[{"name":"minecraft","display":"Minecraft: Java"},{"name":"terraria","display":"Terraria"}]"#,
        );
        let client = client(&api);
        client.session().replace(Session::new("t", Vec::new()));

        let servers = client.servers().await.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].id(), "a1b2");
        assert_eq!(servers[0].name(), "Survival");
        assert_eq!(servers[0].node()["name"], "local");
        assert!(!servers[0].is_connected());

        let templates = client.templates().await.unwrap();
        let names: Vec<_> = templates.iter().map(Template::name).collect();
        assert_eq!(names, vec!["minecraft", "terraria"]);
    }

    #[tokio::test]
    async fn test_who_am_i() {
        let api = Arc::new(FakeApi::default());
        api.route(
            Method::Get,
            "/api/self",
            200,
            r#"{"id":7,"username":"admin","email":"admin@example.com"}"#,
        );
        let client = client(&api);
        client.session().replace(Session::new("t", Vec::new()));

        let user = client.who_am_i().await.unwrap();
        assert_eq!(user.id(), 7);
        assert_eq!(user.username(), "admin");
    }

    #[test]
    fn test_logout_clears_shared_session() {
        let api = Arc::new(FakeApi::default());
        let client = client(&api);
        let shared = client.session().clone();
        client.session().replace(Session::new("t", Vec::new()));
        assert!(shared.is_logged_in());
        client.logout();
        assert!(!shared.is_logged_in());
    }
}
