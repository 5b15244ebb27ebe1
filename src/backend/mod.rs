//! Identity backend access. Flows talk to the backend only through
//! [`IdentityBackend`] so tests can substitute a scripted implementation.

pub mod http;
pub mod types;

pub use http::{BackendConfig, HttpBackend};
pub use types::{
    extract_detail, AuthResponse, CaptureRequest, LoginRequest, MagicLinkRequest,
    RegisterRequest,
};

use secrecy::SecretString;
use std::{future::Future, pin::Pin};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Request failed ({status}): {}", detail.as_deref().unwrap_or("no detail"))]
    Http { status: u16, detail: Option<String> },
    #[error("Unable to reach the server: {0}")]
    Network(String),
    #[error("Request timed out. Please try again.")]
    Timeout,
    #[error("Failed to decode response: {0}")]
    Parse(String),
}

impl BackendError {
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message supplied by the backend, if any.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Http { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BackendError>> + Send + 'a>>;

pub trait IdentityBackend: Send + Sync {
    /// `POST /auth/register`
    fn register<'a>(&'a self, request: &'a RegisterRequest) -> BackendFuture<'a, AuthResponse>;

    /// `POST /auth/login`
    fn login<'a>(&'a self, request: &'a LoginRequest) -> BackendFuture<'a, AuthResponse>;

    /// `POST /auth/capture` with `Authorization: Bearer <token>`
    fn capture<'a>(
        &'a self,
        access_token: &'a SecretString,
        request: &'a CaptureRequest,
    ) -> BackendFuture<'a, ()>;

    /// `POST /magic_link/request`
    fn request_magic_link<'a>(&'a self, request: &'a MagicLinkRequest) -> BackendFuture<'a, ()>;

    /// `GET /magic_link/verify?token=...`
    fn verify_magic_link<'a>(&'a self, token: &'a str) -> BackendFuture<'a, AuthResponse>;
}
