//! Password-free login by emailed link.
//!
//! Requesting a link ends at `Sent`; the user continues out of band. Verifying
//! a token is independent of any earlier request on this instance.

use super::{backend_message, validate_email, Coordinator, FlowCell, FlowError};
use crate::{backend::MagicLinkRequest, session::Session};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

const REQUEST_FAILED: &str = "Failed to send magic link. Please try again.";
const VERIFY_FAILED: &str = "Invalid or expired magic link.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MagicLinkState {
    Idle,
    Sending,
    Sent,
    Verifying,
    Succeeded,
    Failed(String),
}

pub struct MagicLinkFlow {
    coordinator: Coordinator,
    cell: FlowCell<MagicLinkState>,
}

impl MagicLinkFlow {
    pub(crate) fn new(coordinator: Coordinator) -> Self {
        Self {
            coordinator,
            cell: FlowCell::new(MagicLinkState::Idle),
        }
    }

    #[must_use]
    pub fn state(&self) -> MagicLinkState {
        self.cell.get()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MagicLinkState> {
        self.cell.subscribe()
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        match self.cell.get() {
            MagicLinkState::Failed(message) => Some(message),
            _ => None,
        }
    }

    fn fail(&self, err: FlowError) -> FlowError {
        self.cell.set(MagicLinkState::Failed(err.to_string()));
        err
    }

    /// Ask the backend to email a sign-in link.
    ///
    /// # Errors
    /// `ValidationFailed`, `Busy`, `OutOfOrder` once a link was sent, or
    /// `NetworkOrServerFailure`.
    #[instrument(skip_all)]
    pub async fn request(&self, email: &str) -> Result<(), FlowError> {
        let _in_flight = self.cell.begin()?;

        if self.cell.get() == MagicLinkState::Sent {
            return Err(FlowError::OutOfOrder("link already sent"));
        }

        let email = validate_email(email).map_err(|err| self.fail(err))?;
        self.cell.set(MagicLinkState::Sending);

        match self
            .coordinator
            .backend()
            .request_magic_link(&MagicLinkRequest { email })
            .await
        {
            Ok(()) => {
                info!("magic link sent");
                self.cell.set(MagicLinkState::Sent);
                Ok(())
            }
            Err(err) => {
                warn!("magic link request failed: {err}");
                Err(self.fail(FlowError::NetworkOrServerFailure(backend_message(
                    &err,
                    REQUEST_FAILED,
                ))))
            }
        }
    }

    /// Return to `Idle` so another address can be entered.
    ///
    /// # Errors
    /// `Busy` while a call is pending.
    pub fn back(&self) -> Result<(), FlowError> {
        let _in_flight = self.cell.begin()?;
        self.cell.set(MagicLinkState::Idle);
        Ok(())
    }

    /// Exchange a link token for a session.
    ///
    /// # Errors
    /// `ValidationFailed` for a blank token, `InvalidOrExpiredToken` for a
    /// rejected link, or `NetworkOrServerFailure`. The session is unchanged
    /// on failure.
    #[instrument(skip_all)]
    pub async fn verify(&self, token: &str) -> Result<Session, FlowError> {
        let _in_flight = self.cell.begin()?;

        let token = token.trim();
        if token.is_empty() {
            return Err(self.fail(FlowError::ValidationFailed {
                field: "token",
                message: "No token provided".to_string(),
            }));
        }

        self.cell.set(MagicLinkState::Verifying);

        let response = match self.coordinator.backend().verify_magic_link(token).await {
            Ok(response) => response,
            Err(err) => {
                warn!("magic link verification failed: {err}");
                let message = backend_message(&err, VERIFY_FAILED);
                let err = match err.status() {
                    Some(400 | 401 | 404 | 410) => FlowError::InvalidOrExpiredToken(message),
                    _ => FlowError::NetworkOrServerFailure(message),
                };
                return Err(self.fail(err));
            }
        };

        let session = response.into_session();
        self.coordinator.session().establish(session.clone()).await;

        info!(user_id = %session.user_id(), "logged in by magic link");
        self.cell.set(MagicLinkState::Succeeded);
        Ok(session)
    }
}
