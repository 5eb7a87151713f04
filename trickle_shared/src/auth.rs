//! Authentication collaborator.
//!
//! # Flow
//! 1. The player signs up / logs in with a username and password.
//! 2. The backend answers with `{user_id, token}`.
//! 3. The token goes into the event channel URL (`?auth=<token>`); the user id
//!    tells the client which broadcasts are about the local player.
//!
//! The HTTP calls live outside this workspace. The core only needs a
//! [`Session`], obtained through the [`Authenticator`] trait.

use std::collections::HashMap;

use anyhow::bail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Login request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

/// Login response: everything the core needs to open a connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub token: String,
}

/// Produces a [`Session`] for a set of credentials.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> anyhow::Result<Session>;
}

/// In-memory authenticator for tests and offline runs.
///
/// Accounts are registered up front; `login` checks the password the way the
/// backend does (unknown user, then password mismatch).
#[derive(Debug, Default)]
pub struct StaticAuthenticator {
    accounts: HashMap<String, (String, Session)>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account. A second registration of the same username is
    /// rejected, matching the backend's "username taken" rule.
    pub fn register(&mut self, credentials: Credentials, session: Session) -> anyhow::Result<()> {
        if self.accounts.contains_key(&credentials.username) {
            bail!("username taken: {}", credentials.username);
        }
        self.accounts
            .insert(credentials.username, (credentials.password, session));
        Ok(())
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn login(&self, credentials: &Credentials) -> anyhow::Result<Session> {
        let Some((password, session)) = self.accounts.get(&credentials.username) else {
            bail!("not found: {}", credentials.username);
        };
        if *password != credentials.password {
            bail!("password does not match");
        }
        Ok(session.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str) -> Session {
        Session {
            user_id: id.to_string(),
            token: format!("tok-{id}"),
        }
    }

    #[tokio::test]
    async fn login_returns_registered_session() {
        let mut auth = StaticAuthenticator::new();
        auth.register(Credentials::new("ada", "pw"), session("u1"))
            .unwrap();

        let s = auth.login(&Credentials::new("ada", "pw")).await.unwrap();
        assert_eq!(s, session("u1"));
    }

    #[tokio::test]
    async fn login_rejects_unknown_user_and_bad_password() {
        let mut auth = StaticAuthenticator::new();
        auth.register(Credentials::new("ada", "pw"), session("u1"))
            .unwrap();

        let err = auth.login(&Credentials::new("bob", "pw")).await.unwrap_err();
        assert!(err.to_string().contains("not found"));

        let err = auth.login(&Credentials::new("ada", "nope")).await.unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let mut auth = StaticAuthenticator::new();
        auth.register(Credentials::new("ada", "pw"), session("u1"))
            .unwrap();
        assert!(auth
            .register(Credentials::new("ada", "other"), session("u2"))
            .is_err());
    }

    #[test]
    fn session_json_shape() {
        let s: Session = serde_json::from_str(r#"{"user_id":"u1","token":"t"}"#).unwrap();
        assert_eq!(s.user_id, "u1");
        assert_eq!(s.token, "t");
    }
}
