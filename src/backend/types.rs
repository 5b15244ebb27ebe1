//! Request and response payloads for the identity backend. Requests carry
//! biometric data and tokens, so they must never be logged.

use crate::session::{Session, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use utoipa::ToSchema;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub full_name: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub iris_data: String,
}

#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct CaptureRequest {
    /// Base64 JPEG, no data-URL prefix.
    pub iris_data: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
}

#[derive(Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user_id: UserId,
    pub email: String,
}

impl AuthResponse {
    #[must_use]
    pub fn into_session(self) -> Session {
        Session::new(self.access_token, self.user_id, self.email)
    }
}

impl fmt::Debug for AuthResponse {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthResponse")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Pull a human-readable message out of a backend error body.
///
/// Accepts `{"detail": "..."}` and the validation form
/// `{"detail": [{"msg": "..."}]}`.
#[must_use]
pub fn extract_detail(body: &Value) -> Option<String> {
    let detail = body.get("detail")?;
    let message = match detail {
        Value::String(message) => message.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .find_map(|item| item.get("msg").and_then(Value::as_str))
            .map(|message| message.trim().to_string())?,
        _ => return None,
    };

    if message.is_empty() {
        None
    } else {
        Some(message)
    }
}
