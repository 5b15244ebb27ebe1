//! Registration: create the account, sign in, then enroll an iris image.
//!
//! Account creation and enrollment are separate steps. Once the account call
//! succeeds the session is established and stays established whatever
//! happens during enrollment.

use super::{backend_message, validate_email, Coordinator, FlowCell, FlowError, FlowState};
use crate::{
    backend::{CaptureRequest, RegisterRequest},
    session::Session,
};
use std::sync::OnceLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

const REGISTER_FAILED: &str = "Registration failed. Please try again.";
const ENROLL_FAILED: &str = "Failed to capture iris. Please try again.";

/// Result of a full registration run. `enrollment` failing does not undo the
/// session.
#[derive(Debug)]
pub struct RegisterOutcome {
    pub session: Session,
    pub enrollment: Result<(), FlowError>,
}

pub struct RegisterFlow {
    coordinator: Coordinator,
    cell: FlowCell<FlowState>,
    account: OnceLock<Session>,
}

impl RegisterFlow {
    pub(crate) fn new(coordinator: Coordinator) -> Self {
        Self {
            coordinator,
            cell: FlowCell::new(FlowState::CollectingIdentity),
            account: OnceLock::new(),
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

    /// Message of the current failure, if any.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        match self.cell.get() {
            FlowState::Failed(message) => Some(message),
            _ => None,
        }
    }

    fn fail(&self, err: FlowError) -> FlowError {
        self.cell.set(FlowState::Failed(err.to_string()));
        err
    }

    /// Create the account and establish its session.
    ///
    /// # Errors
    /// `ValidationFailed` before any network call, `Busy` while another step
    /// is pending, or the backend failure.
    #[instrument(skip_all)]
    pub async fn submit(&self, email: &str, full_name: &str) -> Result<Session, FlowError> {
        let _in_flight = self.cell.begin()?;

        if self.account.get().is_some() {
            return Err(FlowError::OutOfOrder("account already created"));
        }

        let email = validate_email(email).map_err(|err| self.fail(err))?;
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(self.fail(FlowError::ValidationFailed {
                field: "full_name",
                message: "Full name is required".to_string(),
            }));
        }

        self.cell.set(FlowState::Submitting);

        let request = RegisterRequest {
            email,
            full_name: full_name.to_string(),
        };
        let response = match self.coordinator.backend().register(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!("registration failed: {err}");
                return Err(self.fail(FlowError::NetworkOrServerFailure(backend_message(
                    &err,
                    REGISTER_FAILED,
                ))));
            }
        };

        let session = response.into_session();
        self.coordinator.session().establish(session.clone()).await;
        if self.account.set(session.clone()).is_err() {
            warn!("account already recorded for this registration");
        }

        info!(user_id = %session.user_id(), "account created");
        self.cell.set(FlowState::Capturing);
        Ok(session)
    }

    /// Capture an iris image and attach it to the new account. May be retried
    /// after a failure.
    ///
    /// # Errors
    /// Capture errors, `Unauthorized` when the session is gone or rejected,
    /// or the backend failure. The session is left untouched in every case.
    #[instrument(skip_all)]
    pub async fn enroll(&self, cancel: &CancellationToken) -> Result<(), FlowError> {
        let _in_flight = self.cell.begin()?;

        if self.account.get().is_none() {
            return Err(FlowError::OutOfOrder("account not created yet"));
        }
        if !matches!(self.cell.get(), FlowState::Capturing | FlowState::Failed(_)) {
            return Err(FlowError::OutOfOrder("enrollment already finished"));
        }

        self.cell.set(FlowState::Capturing);

        let mut machine = self.coordinator.capture_machine();
        let payload = match machine.run(cancel).await {
            Ok(payload) => payload,
            Err(err) => {
                let err = FlowError::from(err);
                if err == FlowError::Cancelled {
                    // Skipping enrollment lands on the signed-in state.
                    self.cell.set(FlowState::Succeeded);
                    return Err(err);
                }
                return Err(self.fail(err));
            }
        };
        drop(machine);

        self.cell.set(FlowState::Submitting);

        let Some(session) = self.coordinator.session().current() else {
            return Err(self.fail(FlowError::Unauthorized(
                "You are no longer signed in.".to_string(),
            )));
        };

        let request = CaptureRequest {
            iris_data: payload.to_base64(),
        };
        match self
            .coordinator
            .backend()
            .capture(session.access_token(), &request)
            .await
        {
            Ok(()) => {
                info!("iris enrolled");
                self.cell.set(FlowState::Succeeded);
                Ok(())
            }
            Err(err) => {
                warn!("enrollment failed: {err}");
                let message = backend_message(&err, ENROLL_FAILED);
                let err = if err.status() == Some(401) {
                    FlowError::Unauthorized(message)
                } else {
                    FlowError::NetworkOrServerFailure(message)
                };
                Err(self.fail(err))
            }
        }
    }

    /// Leave without enrolling; the account and session remain.
    ///
    /// # Errors
    /// `Busy` while a step is pending, `OutOfOrder` before the account exists.
    pub fn skip_enrollment(&self) -> Result<(), FlowError> {
        let _in_flight = self.cell.begin()?;
        if self.account.get().is_none() {
            return Err(FlowError::OutOfOrder("account not created yet"));
        }
        self.cell.set(FlowState::Succeeded);
        Ok(())
    }

    /// Submit then enroll.
    ///
    /// # Errors
    /// Only account creation errors; enrollment errors are in the outcome.
    pub async fn run(
        &self,
        email: &str,
        full_name: &str,
        cancel: &CancellationToken,
    ) -> Result<RegisterOutcome, FlowError> {
        let session = self.submit(email, full_name).await?;
        let enrollment = self.enroll(cancel).await;
        Ok(RegisterOutcome {
            session,
            enrollment,
        })
    }
}
