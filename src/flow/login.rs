//! Biometric login: email first, then an iris capture submitted with it.

use super::{backend_message, validate_email, Coordinator, FlowCell, FlowError, FlowState};
use crate::{backend::LoginRequest, session::Session};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

const LOGIN_FAILED: &str = "Login failed. Please try again.";

pub struct LoginFlow {
    coordinator: Coordinator,
    cell: FlowCell<FlowState>,
    email: Mutex<Option<String>>,
}

impl LoginFlow {
    pub(crate) fn new(coordinator: Coordinator) -> Self {
        Self {
            coordinator,
            cell: FlowCell::new(FlowState::CollectingIdentity),
            email: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn state(&self) -> FlowState {
        self.cell.get()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.cell.subscribe()
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        match self.cell.get() {
            FlowState::Failed(message) => Some(message),
            _ => None,
        }
    }

    fn email(&self) -> Option<String> {
        self.email
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fail(&self, err: FlowError) -> FlowError {
        self.cell.set(FlowState::Failed(err.to_string()));
        err
    }

    fn set_email(&self, email: Option<String>) {
        *self.email.lock().unwrap_or_else(PoisonError::into_inner) = email;
    }

    /// Accept the email and move on to capture. A rejected address also
    /// forgets the previously accepted one.
    ///
    /// # Errors
    /// `ValidationFailed` for a missing or malformed address, `Busy` while a
    /// submission is pending.
    pub fn continue_with_email(&self, email: &str) -> Result<(), FlowError> {
        let _in_flight = self.cell.begin()?;
        match validate_email(email) {
            Ok(email) => {
                self.set_email(Some(email));
                self.cell.set(FlowState::Capturing);
                Ok(())
            }
            Err(err) => {
                self.set_email(None);
                Err(self.fail(err))
            }
        }
    }

    /// Capture an iris image and log in with it. After a capture or backend
    /// failure this may be called again with the same email.
    ///
    /// # Errors
    /// Capture errors, `CredentialMismatch` when the backend rejects the
    /// image, or `NetworkOrServerFailure`.
    #[instrument(skip_all)]
    pub async fn capture_and_submit(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Session, FlowError> {
        let _in_flight = self.cell.begin()?;

        let Some(email) = self.email() else {
            return Err(FlowError::OutOfOrder("no valid email entered"));
        };
        if !matches!(self.cell.get(), FlowState::Capturing | FlowState::Failed(_)) {
            return Err(FlowError::OutOfOrder("login already finished"));
        }

        self.cell.set(FlowState::Capturing);

        let mut machine = self.coordinator.capture_machine();
        let payload = match machine.run(cancel).await {
            Ok(payload) => payload,
            Err(err) => {
                let err = FlowError::from(err);
                if err == FlowError::Cancelled {
                    self.cell.set(FlowState::CollectingIdentity);
                    return Err(err);
                }
                return Err(self.fail(err));
            }
        };
        drop(machine);

        self.cell.set(FlowState::Submitting);

        let request = LoginRequest {
            email,
            iris_data: payload.to_base64(),
        };
        let response = match self.coordinator.backend().login(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!("login failed: {err}");
                let message = backend_message(&err, LOGIN_FAILED);
                let err = if err.status() == Some(401) {
                    FlowError::CredentialMismatch(message)
                } else {
                    FlowError::NetworkOrServerFailure(message)
                };
                return Err(self.fail(err));
            }
        };

        let session = response.into_session();
        self.coordinator.session().establish(session.clone()).await;

        info!(user_id = %session.user_id(), "logged in");
        self.cell.set(FlowState::Succeeded);
        Ok(session)
    }

    /// `continue_with_email` followed by `capture_and_submit`.
    ///
    /// # Errors
    /// Whichever step fails first.
    pub async fn run(&self, email: &str, cancel: &CancellationToken) -> Result<Session, FlowError> {
        self.continue_with_email(email)?;
        self.capture_and_submit(cancel).await
    }
}
