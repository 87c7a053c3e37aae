use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};

/// Identity of the signed-in user as the auth collaborator reports it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

/// Opaque session token issued by the auth collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionToken(pub String);

/// The authentication collaborator. Token storage across restarts is the
/// collaborator's concern, not ours.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, new_user: NewUser) -> Result<AuthUser>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionToken>;

    /// Resolve a token back to the identity it was issued for. Expired or
    /// unknown tokens fail `Unauthenticated`.
    async fn verify(&self, token: &SessionToken) -> Result<AuthUser>;

    async fn sign_out(&self, token: &SessionToken) -> Result<()>;
}

/// Per-client session state handed to every service. Identity is owned by
/// the auth collaborator; `current_user` re-verifies on each call rather
/// than caching a copy that could go stale.
#[derive(Clone)]
pub struct SessionContext {
    provider: Arc<dyn AuthProvider>,
    token: Arc<RwLock<Option<SessionToken>>>,
}

impl SessionContext {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self {
            provider,
            token: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn sign_up(&self, new_user: NewUser) -> Result<AuthUser> {
        self.provider.sign_up(new_user).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<()> {
        let token = self.provider.sign_in(email, password).await?;
        *self.token.write().await = Some(token);
        debug!(email, "session opened");
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<()> {
        let token = self.token.write().await.take();
        if let Some(token) = token {
            self.provider.sign_out(&token).await?;
            debug!("session closed");
        }
        Ok(())
    }

    /// Current identity, or `Unauthenticated` when no session is active.
    pub async fn current_user(&self) -> Result<AuthUser> {
        let guard = self.token.read().await;
        let token = guard.as_ref().ok_or(Error::Unauthenticated)?;
        self.provider.verify(token).await
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::memory::auth::MemoryAuth;

    fn new_user(email: &str, name: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password: "hunter2".to_string(),
            display_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn sign_in_then_current_user_round_trips_identity() {
        let session = SessionContext::new(Arc::new(MemoryAuth::new()));
        let created = session.sign_up(new_user("ada@example.com", "Ada")).await.unwrap();

        session.sign_in("ada@example.com", "hunter2").await.unwrap();
        let user = session.current_user().await.unwrap();

        assert_eq!(user.uid, created.uid);
        assert_eq!(user.display_name, "Ada");
    }

    #[tokio::test]
    async fn current_user_without_session_is_unauthenticated() {
        let session = SessionContext::new(Arc::new(MemoryAuth::new()));
        assert!(matches!(
            session.current_user().await,
            Err(Error::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn sign_out_invalidates_the_token() {
        let session = SessionContext::new(Arc::new(MemoryAuth::new()));
        session.sign_up(new_user("bob@example.com", "Bob")).await.unwrap();
        session.sign_in("bob@example.com", "hunter2").await.unwrap();
        session.sign_out().await.unwrap();

        assert!(matches!(
            session.current_user().await,
            Err(Error::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let session = SessionContext::new(Arc::new(MemoryAuth::new()));
        session.sign_up(new_user("eve@example.com", "Eve")).await.unwrap();

        assert!(matches!(
            session.sign_in("eve@example.com", "wrong").await,
            Err(Error::Validation(_))
        ));
    }
}
