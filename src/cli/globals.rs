use crate::{
    backend::{BackendConfig, HttpBackend, IdentityBackend},
    capture::{CaptureDevice, CaptureSettings, StillImageDevice, UnavailableDevice},
    flow::Coordinator,
    session::{FileSessionStore, SessionPersistence, SessionStore},
};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};

/// Options shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub backend: BackendConfig,
    pub session_file: Option<PathBuf>,
    pub capture_source: Option<PathBuf>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            session_file: None,
            capture_source: None,
        }
    }

    /// Explicit session file, else the platform default.
    ///
    /// # Errors
    /// Returns an error if no home directory can be determined.
    pub fn session_path(&self) -> Result<PathBuf> {
        match &self.session_file {
            Some(path) => Ok(path.clone()),
            None => FileSessionStore::default_path()
                .context("no data directory available, use --session-file"),
        }
    }

    /// File-backed store with any persisted session already restored.
    ///
    /// # Errors
    /// Returns an error if the session path cannot be resolved.
    pub async fn session_store(&self) -> Result<SessionStore> {
        let persistence: Arc<dyn SessionPersistence> =
            Arc::new(FileSessionStore::new(self.session_path()?));
        let store = SessionStore::new(Some(persistence));
        store.restore().await;
        Ok(store)
    }

    #[must_use]
    pub fn capture_device(&self) -> Arc<dyn CaptureDevice> {
        match &self.capture_source {
            Some(path) => Arc::new(StillImageDevice::new(path)),
            None => Arc::new(UnavailableDevice::new(
                "no capture source configured, use --capture-source",
            )),
        }
    }

    /// Coordinator over the HTTP backend and a restored session.
    ///
    /// # Errors
    /// Returns an error if the HTTP client or the session store cannot be set up.
    pub async fn coordinator(&self) -> Result<Coordinator> {
        let backend: Arc<dyn IdentityBackend> = Arc::new(
            HttpBackend::new(self.backend.clone()).context("Failed to create backend client")?,
        );
        let session = self.session_store().await?;

        Ok(Coordinator::new(
            backend,
            session,
            self.capture_device(),
            CaptureSettings::default(),
        ))
    }
}
