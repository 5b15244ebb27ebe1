//! Credential flows: register (account, then iris enrollment), biometric
//! login, and magic link. A [`Coordinator`] hands out one flow instance per
//! attempt; flows are the only writers of the session store.
//!
//! Each flow instance allows one backend call at a time. A second submit
//! while one is pending is rejected with [`FlowError::Busy`].

pub mod login;
pub mod magic_link;
pub mod register;

#[cfg(test)]
pub(crate) mod test_support;

pub use login::LoginFlow;
pub use magic_link::{MagicLinkFlow, MagicLinkState};
pub use register::{RegisterFlow, RegisterOutcome};

use crate::{
    backend::{BackendError, IdentityBackend},
    capture::{CaptureDevice, CaptureError, CaptureMachine, CaptureSettings, CaptureState},
    session::SessionStore,
};
use regex::Regex;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock,
};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    CollectingIdentity,
    Capturing,
    Submitting,
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("Failed to access camera: {0}")]
    DeviceAccessDenied(String),
    #[error("No image was captured. Please try again.")]
    CaptureNotReady,
    #[error("Capture cancelled")]
    Cancelled,
    #[error("{message}")]
    ValidationFailed {
        field: &'static str,
        message: String,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    InvalidOrExpiredToken(String),
    #[error("{0}")]
    CredentialMismatch(String),
    #[error("{0}")]
    NetworkOrServerFailure(String),
    #[error("A request is already in progress")]
    Busy,
    #[error("Not available at this step: {0}")]
    OutOfOrder(&'static str),
}

impl From<CaptureError> for FlowError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::DeviceAccessDenied(reason) => Self::DeviceAccessDenied(reason),
            CaptureError::NotReady | CaptureError::Encoding(_) => Self::CaptureNotReady,
            CaptureError::Cancelled => Self::Cancelled,
            CaptureError::AlreadyActive => Self::Busy,
        }
    }
}

/// Backend message when present, otherwise the flow's generic message.
pub(crate) fn backend_message(err: &BackendError, fallback: &str) -> String {
    err.detail().map_or_else(|| fallback.to_string(), str::to_string)
}

#[must_use]
pub fn valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(email))
}

/// Trimmed email, or a field-level validation error.
pub(crate) fn validate_email(email: &str) -> Result<String, FlowError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(FlowError::ValidationFailed {
            field: "email",
            message: "Email is required".to_string(),
        });
    }
    if !valid_email(email) {
        return Err(FlowError::ValidationFailed {
            field: "email",
            message: "Please enter a valid email address".to_string(),
        });
    }
    Ok(email.to_string())
}

/// Shared collaborators for every flow.
#[derive(Clone)]
pub struct Coordinator {
    backend: Arc<dyn IdentityBackend>,
    session: SessionStore,
    device: Arc<dyn CaptureDevice>,
    capture: CaptureSettings,
    progress: Arc<watch::Sender<CaptureState>>,
}

impl Coordinator {
    #[must_use]
    pub fn new(
        backend: Arc<dyn IdentityBackend>,
        session: SessionStore,
        device: Arc<dyn CaptureDevice>,
        capture: CaptureSettings,
    ) -> Self {
        let (progress, _) = watch::channel(CaptureState::Idle);
        Self {
            backend,
            session,
            device,
            capture,
            progress: Arc::new(progress),
        }
    }

    /// Read access for callers; writes go through the flows and `logout`.
    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    #[must_use]
    pub fn register_flow(&self) -> RegisterFlow {
        RegisterFlow::new(self.clone())
    }

    #[must_use]
    pub fn login_flow(&self) -> LoginFlow {
        LoginFlow::new(self.clone())
    }

    #[must_use]
    pub fn magic_link_flow(&self) -> MagicLinkFlow {
        MagicLinkFlow::new(self.clone())
    }

    /// Capture transitions of whichever flow is currently capturing, e.g. to
    /// render the countdown.
    #[must_use]
    pub fn subscribe_capture(&self) -> watch::Receiver<CaptureState> {
        self.progress.subscribe()
    }

    pub async fn logout(&self) {
        self.session.clear().await;
    }

    /// Fresh capture machine; one per attempt. Every clone of this
    /// coordinator publishes to the same progress channel, so only one
    /// capture may run at a time per coordinator.
    pub(crate) fn capture_machine(&self) -> CaptureMachine {
        CaptureMachine::with_state(self.device.clone(), self.capture, self.progress.clone())
    }

    pub(crate) fn backend(&self) -> &dyn IdentityBackend {
        self.backend.as_ref()
    }
}

/// State plus re-entrancy guard for one flow instance.
pub(crate) struct FlowCell<S> {
    state: watch::Sender<S>,
    in_flight: AtomicBool,
}

impl<S: Clone> FlowCell<S> {
    pub(crate) fn new(initial: S) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state,
            in_flight: AtomicBool::new(false),
        }
    }

    pub(crate) fn get(&self) -> S {
        self.state.borrow().clone()
    }

    pub(crate) fn set(&self, next: S) {
        self.state.send_replace(next);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<S> {
        self.state.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claim the flow for one step; released when the guard drops.
    pub(crate) fn begin(&self) -> Result<InFlight<'_>, FlowError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| FlowError::Busy)?;
        Ok(InFlight(&self.in_flight))
    }
}

pub(crate) struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
