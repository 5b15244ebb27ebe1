//! Process-wide session state. The store restores a persisted session once at
//! startup, exposes a loading flag until that finishes, and is written only
//! through [`SessionStore::establish`] and [`SessionStore::clear`]. The access
//! token is held as a secret and never logged.

pub mod persistence;

pub use persistence::{FileSessionStore, PersistenceError, SessionPersistence};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, sync::Arc};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Backend user identifier; the backend may send it as a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(number) => Self::from(number),
            RawId::Text(text) => Self(text),
        })
    }
}

#[derive(Clone, Debug)]
pub struct Session {
    access_token: SecretString,
    user_id: UserId,
    email: String,
}

impl Session {
    #[must_use]
    pub fn new(access_token: impl Into<String>, user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            user_id,
            email: email.into(),
        }
    }

    #[must_use]
    pub fn access_token(&self) -> &SecretString {
        &self.access_token
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.access_token.expose_secret() == other.access_token.expose_secret()
            && self.user_id == other.user_id
            && self.email == other.email
    }
}

impl Eq for Session {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// A persisted session may still be restored; do not treat the user as
    /// logged out yet.
    Loading,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub session: Option<Session>,
}

#[derive(Clone)]
pub struct SessionStore {
    state: Arc<watch::Sender<SessionSnapshot>>,
    persistence: Option<Arc<dyn SessionPersistence>>,
}

impl SessionStore {
    /// Store backed by `persistence`. It stays `Loading` until
    /// [`restore`](Self::restore) runs.
    #[must_use]
    pub fn new(persistence: Option<Arc<dyn SessionPersistence>>) -> Self {
        let status = if persistence.is_some() {
            SessionStatus::Loading
        } else {
            SessionStatus::Ready
        };
        let (state, _) = watch::channel(SessionSnapshot {
            status,
            session: None,
        });
        Self {
            state: Arc::new(state),
            persistence,
        }
    }

    /// Store with nothing to restore.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.state.borrow().session.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().status == SessionStatus::Loading
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().session.is_some()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Load a previously persisted session. Failures are logged and leave the
    /// user logged out.
    #[instrument(skip(self))]
    pub async fn restore(&self) {
        if let Some(persistence) = &self.persistence {
            match persistence.load().await {
                Ok(Some(session)) => {
                    debug!(user_id = %session.user_id(), "restored persisted session");
                    self.state.send_modify(|state| {
                        // A session established while loading wins.
                        if state.session.is_none() {
                            state.session = Some(session);
                        }
                    });
                }
                Ok(None) => debug!("no persisted session"),
                Err(err) => warn!("Failed to restore session: {err}"),
            }
        }

        self.state.send_modify(|state| state.status = SessionStatus::Ready);
    }

    /// Replace the current session; never merges with the previous one.
    #[instrument(skip_all, fields(user_id = %session.user_id()))]
    pub async fn establish(&self, session: Session) {
        self.state.send_modify(|state| {
            state.session = Some(session.clone());
            state.status = SessionStatus::Ready;
        });
        info!("session established");

        if let Some(persistence) = &self.persistence {
            if let Err(err) = persistence.save(&session).await {
                warn!("Failed to persist session: {err}");
            }
        }
    }

    /// Drop the current session. A no-op when logged out.
    #[instrument(skip(self))]
    pub async fn clear(&self) {
        let cleared = self.state.send_if_modified(|state| state.session.take().is_some());
        if !cleared {
            return;
        }
        info!("session cleared");

        if let Some(persistence) = &self.persistence {
            if let Err(err) = persistence.remove().await {
                warn!("Failed to remove persisted session: {err}");
            }
        }
    }
}
