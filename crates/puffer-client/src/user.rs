//! User facade.

use puffer_core::UserInfo;
use serde_json::Value;

use crate::{client::Context, error::Result};

/// A panel user.
#[derive(Debug, Clone)]
pub struct User {
    info: UserInfo,
    ctx: Context,
}

impl User {
    pub(crate) const fn new(info: UserInfo, ctx: Context) -> Self {
        Self { info, ctx }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.info.id
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.info.username
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.info.email
    }

    #[must_use]
    pub const fn info(&self) -> &UserInfo {
        &self.info
    }

    /// Panel-wide permissions, as returned by the panel.
    ///
    /// # Errors
    /// Returns the REST error if the panel rejects the request.
    pub async fn global_permissions(&self) -> Result<Value> {
        self.ctx
            .get_json(&format!("/api/users/{}/perms", self.info.id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use puffer_core::Method;

    use super::*;
    use crate::client::testing::{FakeApi, logged_in_context};

    #[tokio::test]
    async fn test_global_permissions() {
        let api = Arc::new(FakeApi::default());
        api.route(
            Method::Get,
            "/api/users/3/perms",
            200,
            r#"{"admin":false,"servers.view":true}"#,
        );
        let user = User::new(
            UserInfo {
                id: 3,
                username: "mod".to_string(),
                email: "mod@example.com".to_string(),
            },
            logged_in_context(&api),
        );

        let perms = user.global_permissions().await.unwrap();
        assert_eq!(perms["servers.view"], true);
        assert_eq!(user.email(), "mod@example.com");
    }
}
