//! Scripted backend and coordinator wiring for flow tests.

use super::Coordinator;
use crate::{
    backend::{
        AuthResponse, BackendError, BackendFuture, CaptureRequest, IdentityBackend, LoginRequest,
        MagicLinkRequest, RegisterRequest,
    },
    capture::{device::testing::FakeDevice, CaptureSettings},
    session::{SessionStore, UserId},
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Register { email: String, full_name: String },
    Login { email: String, iris_data: String },
    Capture { token: String, iris_data: String },
    RequestMagicLink { email: String },
    VerifyMagicLink { token: String },
}

/// Lets a test hold a backend call open.
#[derive(Default)]
pub(crate) struct Gate {
    pub(crate) entered: Notify,
    pub(crate) release: Notify,
}

pub(crate) fn auth(token: &str, user_id: i64, email: &str) -> AuthResponse {
    AuthResponse {
        access_token: token.to_string(),
        user_id: UserId::from(user_id),
        email: email.to_string(),
    }
}

pub(crate) fn http_error(status: u16, detail: Option<&str>) -> BackendError {
    BackendError::Http {
        status,
        detail: detail.map(str::to_string),
    }
}

pub(crate) struct ScriptedBackend {
    pub(crate) register_reply: Result<AuthResponse, BackendError>,
    pub(crate) login_reply: Result<AuthResponse, BackendError>,
    pub(crate) capture_reply: Result<(), BackendError>,
    pub(crate) request_reply: Result<(), BackendError>,
    pub(crate) verify_reply: Result<AuthResponse, BackendError>,
    pub(crate) gate: Option<Arc<Gate>>,
    pub(crate) calls: Mutex<Vec<Call>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            register_reply: Ok(auth("t1", 1, "a@x.com")),
            login_reply: Ok(auth("t2", 1, "a@x.com")),
            capture_reply: Ok(()),
            request_reply: Ok(()),
            verify_reply: Ok(auth("t3", 1, "a@x.com")),
            gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedBackend {
    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: Call) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
    }
}

impl IdentityBackend for ScriptedBackend {
    fn register<'a>(&'a self, request: &'a RegisterRequest) -> BackendFuture<'a, AuthResponse> {
        Box::pin(async move {
            self.record(Call::Register {
                email: request.email.clone(),
                full_name: request.full_name.clone(),
            });
            self.pass_gate().await;
            self.register_reply.clone()
        })
    }

    fn login<'a>(&'a self, request: &'a LoginRequest) -> BackendFuture<'a, AuthResponse> {
        Box::pin(async move {
            self.record(Call::Login {
                email: request.email.clone(),
                iris_data: request.iris_data.clone(),
            });
            self.pass_gate().await;
            self.login_reply.clone()
        })
    }

    fn capture<'a>(
        &'a self,
        access_token: &'a SecretString,
        request: &'a CaptureRequest,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.record(Call::Capture {
                token: access_token.expose_secret().to_string(),
                iris_data: request.iris_data.clone(),
            });
            self.pass_gate().await;
            self.capture_reply.clone()
        })
    }

    fn request_magic_link<'a>(&'a self, request: &'a MagicLinkRequest) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.record(Call::RequestMagicLink {
                email: request.email.clone(),
            });
            self.pass_gate().await;
            self.request_reply.clone()
        })
    }

    fn verify_magic_link<'a>(&'a self, token: &'a str) -> BackendFuture<'a, AuthResponse> {
        Box::pin(async move {
            self.record(Call::VerifyMagicLink {
                token: token.to_string(),
            });
            self.pass_gate().await;
            self.verify_reply.clone()
        })
    }
}

pub(crate) fn coordinator(backend: &Arc<ScriptedBackend>, device: &FakeDevice) -> Coordinator {
    let backend: Arc<dyn IdentityBackend> = backend.clone();
    Coordinator::new(
        backend,
        SessionStore::in_memory(),
        Arc::new(device.clone()),
        CaptureSettings::default(),
    )
}
