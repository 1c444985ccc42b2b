//! Single-administrator password gate kept in the key-value store.
//!
//! A successful login issues a bearer token with a fixed lifetime. Tokens are
//! kept under `admin_sessions` as a map of token to expiry, so any number of
//! clients may hold their own session and none of them affects the others.

use crate::services::kv_store::{KeyValueStore, KvError, get_item, set_item};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

const ADMIN_PASSWORD_KEY: &str = "admin_password";
const ADMIN_SESSIONS_KEY: &str = "admin_sessions";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("incorrect password")]
    IncorrectPassword,
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("administrator login required")]
    NotLoggedIn,
    #[error(transparent)]
    Storage(#[from] KvError),
}

pub type AuthResult<T> = Result<T, AuthError>;

type Sessions = HashMap<String, DateTime<Utc>>;

/// A token handed out by [`AdminAuthService::login`].
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AdminAuthService {
    store: Arc<dyn KeyValueStore>,
    default_password: String,
    session_ttl: Duration,
    sessions_lock: Arc<Mutex<()>>,
}

impl AdminAuthService {
    /// `default_password` is stored on the first login attempt if no password
    /// has been set yet.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        default_password: impl Into<String>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            store,
            default_password: default_password.into(),
            session_ttl,
            sessions_lock: Arc::default(),
        }
    }

    /// Whether `token` names an unexpired session.
    pub async fn is_logged_in(&self, token: Option<&str>) -> AuthResult<bool> {
        let Some(token) = token else {
            return Ok(false);
        };
        let sessions = self.sessions().await?;
        Ok(sessions
            .get(token)
            .is_some_and(|expires_at| *expires_at > Utc::now()))
    }

    pub async fn ensure_logged_in(&self, token: Option<&str>) -> AuthResult<()> {
        if self.is_logged_in(token).await? {
            Ok(())
        } else {
            Err(AuthError::NotLoggedIn)
        }
    }

    /// A new session if `password` matched, `None` otherwise.
    pub async fn login(&self, password: &str) -> AuthResult<Option<AdminSession>> {
        let stored = self.stored_password().await?;
        if stored != password {
            warn!("administrator login rejected");
            return Ok(None);
        }

        let session = AdminSession {
            token: format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()),
            expires_at: Utc::now() + self.session_ttl,
        };

        let _guard = self.sessions_lock.lock().await;
        let mut sessions = self.sessions().await?;
        let now = Utc::now();
        let before = sessions.len();
        sessions.retain(|_, expires_at| *expires_at > now);
        if sessions.len() < before {
            debug!("dropped {} expired session(s)", before - sessions.len());
        }
        sessions.insert(session.token.clone(), session.expires_at);
        set_item(self.store.as_ref(), ADMIN_SESSIONS_KEY, &sessions).await?;

        info!("administrator logged in, session valid until {}", session.expires_at);
        Ok(Some(session))
    }

    /// Ends the session named by `token`. Unknown tokens are ignored.
    pub async fn logout(&self, token: &str) -> AuthResult<()> {
        let _guard = self.sessions_lock.lock().await;
        let mut sessions = self.sessions().await?;
        if sessions.remove(token).is_some() {
            set_item(self.store.as_ref(), ADMIN_SESSIONS_KEY, &sessions).await?;
            info!("administrator logged out");
        }
        Ok(())
    }

    /// Sets a new password and ends every open session.
    pub async fn change_password(&self, old_password: &str, new_password: &str) -> AuthResult<()> {
        if new_password.is_empty() {
            return Err(AuthError::EmptyPassword);
        }
        if self.stored_password().await? != old_password {
            warn!("password change rejected");
            return Err(AuthError::IncorrectPassword);
        }
        set_item(self.store.as_ref(), ADMIN_PASSWORD_KEY, new_password).await?;

        let _guard = self.sessions_lock.lock().await;
        set_item(self.store.as_ref(), ADMIN_SESSIONS_KEY, &Sessions::new()).await?;
        info!("administrator password changed, sessions revoked");
        Ok(())
    }

    async fn sessions(&self) -> AuthResult<Sessions> {
        Ok(get_item::<Sessions>(self.store.as_ref(), ADMIN_SESSIONS_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn stored_password(&self) -> AuthResult<String> {
        match get_item::<String>(self.store.as_ref(), ADMIN_PASSWORD_KEY).await? {
            Some(password) => Ok(password),
            None => {
                set_item(
                    self.store.as_ref(),
                    ADMIN_PASSWORD_KEY,
                    self.default_password.as_str(),
                )
                .await?;
                info!("seeded default administrator password");
                Ok(self.default_password.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::kv_store::InMemoryKeyValueStore;

    fn auth() -> AdminAuthService {
        AdminAuthService::new(
            Arc::new(InMemoryKeyValueStore::new()),
            "admin123",
            Duration::hours(1),
        )
    }

    #[tokio::test]
    async fn first_login_uses_default_password() {
        let auth = auth();
        assert!(!auth.is_logged_in(None).await.unwrap());
        assert!(auth.login("wrong").await.unwrap().is_none());

        let session = auth.login("admin123").await.unwrap().unwrap();
        assert_eq!(session.token.len(), 64);
        assert!(session.expires_at > Utc::now());
        assert!(auth.is_logged_in(Some(&session.token)).await.unwrap());

        auth.logout(&session.token).await.unwrap();
        assert!(matches!(
            auth.ensure_logged_in(Some(&session.token)).await,
            Err(AuthError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn sessions_belong_to_their_holder() {
        let auth = auth();
        let first = auth.login("admin123").await.unwrap().unwrap();
        let second = auth.login("admin123").await.unwrap().unwrap();
        assert_ne!(first.token, second.token);

        assert!(!auth.is_logged_in(None).await.unwrap());
        assert!(!auth.is_logged_in(Some("guessed")).await.unwrap());

        auth.logout(&first.token).await.unwrap();
        assert!(!auth.is_logged_in(Some(&first.token)).await.unwrap());
        assert!(auth.is_logged_in(Some(&second.token)).await.unwrap());
    }

    #[tokio::test]
    async fn expired_sessions_are_rejected_and_pruned() {
        let store = Arc::new(InMemoryKeyValueStore::new());
        let auth = AdminAuthService::new(store.clone(), "admin123", Duration::zero());
        let stale = auth.login("admin123").await.unwrap().unwrap();
        assert!(!auth.is_logged_in(Some(&stale.token)).await.unwrap());

        auth.login("admin123").await.unwrap().unwrap();
        let sessions = get_item::<Sessions>(store.as_ref(), ADMIN_SESSIONS_KEY)
            .await
            .unwrap()
            .unwrap();
        assert!(!sessions.contains_key(&stale.token));
    }

    #[tokio::test]
    async fn change_password_checks_old_password_and_revokes_sessions() {
        let auth = auth();
        let session = auth.login("admin123").await.unwrap().unwrap();
        assert!(matches!(
            auth.change_password("nope", "new").await,
            Err(AuthError::IncorrectPassword)
        ));
        assert!(matches!(
            auth.change_password("admin123", "").await,
            Err(AuthError::EmptyPassword)
        ));
        assert!(auth.is_logged_in(Some(&session.token)).await.unwrap());

        auth.change_password("admin123", "s3cret").await.unwrap();

        assert!(!auth.is_logged_in(Some(&session.token)).await.unwrap());
        assert!(auth.login("admin123").await.unwrap().is_none());
        assert!(auth.login("s3cret").await.unwrap().is_some());
    }
}
