//! On-device session record, read once at startup and removed on logout.

use super::{Session, UserId};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::{
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
    pin::Pin,
};
use thiserror::Error;
use tracing::{debug, instrument};

pub type PersistenceFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, PersistenceError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("session file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session file is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

pub trait SessionPersistence: Send + Sync {
    fn load(&self) -> PersistenceFuture<'_, Option<Session>>;

    fn save<'a>(&'a self, session: &'a Session) -> PersistenceFuture<'a, ()>;

    fn remove(&self) -> PersistenceFuture<'_, ()>;
}

#[derive(Serialize, Deserialize)]
struct SessionRecord {
    access_token: String,
    user_id: UserId,
    email: String,
}

/// JSON session file, written with owner-only permissions on unix.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `session.json` under the platform data directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", env!("CARGO_PKG_NAME"))
            .map(|dirs| dirs.data_dir().join("session.json"))
    }
}

impl SessionPersistence for FileSessionStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn load(&self) -> PersistenceFuture<'_, Option<Session>> {
        Box::pin(async move {
            let contents = match tokio::fs::read_to_string(&self.path).await {
                Ok(contents) => contents,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
                Err(err) => return Err(err.into()),
            };
            let record: SessionRecord = serde_json::from_str(&contents)?;
            Ok(Some(Session::new(
                record.access_token,
                record.user_id,
                record.email,
            )))
        })
    }

    fn save<'a>(&'a self, session: &'a Session) -> PersistenceFuture<'a, ()> {
        Box::pin(async move {
            let record = SessionRecord {
                access_token: session.access_token().expose_secret().to_string(),
                user_id: session.user_id().clone(),
                email: session.email().to_string(),
            };
            let contents = serde_json::to_vec(&record)?;

            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&self.path, contents).await?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                    .await?;
            }

            debug!(path = %self.path.display(), "session persisted");
            Ok(())
        })
    }

    fn remove(&self) -> PersistenceFuture<'_, ()> {
        Box::pin(async move {
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err.into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn load_missing_file_is_none() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileSessionStore::new(dir.path().join("absent.json"));
        assert!(store.load().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn remove_missing_file_is_ok() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileSessionStore::new(dir.path().join("absent.json"));
        store.remove().await?;
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn saved_file_is_owner_only() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let store = FileSessionStore::new(dir.path().join("session.json"));
        store
            .save(&Session::new("t1", UserId::from(1), "a@x.com"))
            .await?;

        let mode = std::fs::metadata(store.path())?.permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }

    #[test]
    fn default_path_ends_with_session_file() {
        if let Some(path) = FileSessionStore::default_path() {
            assert!(path.ends_with("session.json"));
        }
    }
}
