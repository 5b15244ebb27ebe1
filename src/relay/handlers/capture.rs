use crate::{
    backend::{extract_detail, CaptureRequest},
    relay::RelayState,
};
use axum::{
    body::Bytes,
    extract::Extension,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument, warn};
use utoipa::ToSchema;

const UNAUTHORIZED: &str = "Unauthorized";
const UPSTREAM_FAILED: &str = "Something went wrong";
const INTERNAL_ERROR: &str = "Internal server error";

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct RelayMessage {
    pub message: String,
}

fn message(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(RelayMessage {
            message: message.into(),
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path= "/api/capture",
    request_body = CaptureRequest,
    responses (
        (status = 200, description = "Iris captured, backend response mirrored", content_type = "application/json"),
        (status = 401, description = "Missing Authorization header", body = RelayMessage),
        (status = 500, description = "Backend unreachable or malformed response", body = RelayMessage),
    ),
    tag = "relay",
)]
/// Forward an iris capture to the backend with the caller's credential.
#[instrument(skip_all)]
pub async fn capture(state: Extension<RelayState>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(authorization) = headers
        .get(AUTHORIZATION)
        .filter(|value| !value.as_bytes().trim_ascii().is_empty())
        .cloned()
    else {
        debug!("capture rejected: no Authorization header");
        return message(StatusCode::UNAUTHORIZED, UNAUTHORIZED);
    };

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!("unreadable capture body: {err}");
            return message(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR);
        }
    };

    let response = match state
        .client()
        .post(state.capture_url())
        .header(AUTHORIZATION, authorization)
        .json(&payload)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            error!("capture relay failed: {err}");
            return message(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR);
        }
    };

    let Ok(status) = StatusCode::from_u16(response.status().as_u16()) else {
        return message(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR);
    };

    let data: Value = match response.json().await {
        Ok(data) => data,
        Err(err) => {
            error!("malformed backend response ({status}): {err}");
            return message(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR);
        }
    };

    if status.is_success() {
        debug!(%status, "capture relayed");
        (status, Json(data)).into_response()
    } else {
        warn!(%status, "backend rejected capture");
        let detail = extract_detail(&data).unwrap_or_else(|| UPSTREAM_FAILED.to_string());
        message(status, detail)
    }
}
