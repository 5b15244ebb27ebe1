#![allow(clippy::needless_for_each)]

#[allow(unused_imports)]
use crate::{
    backend::CaptureRequest,
    relay::handlers::{
        capture, capture::__path_capture, capture::RelayMessage, health, health::__path_health,
        health::Health,
    },
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(health, capture),
    components(
        schemas(Health, RelayMessage, CaptureRequest)
    ),
    tags(
        (name = "relay", description = "Capture submission relay"),
        (name = "health", description = "Build information"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
