//! reqwest implementation of [`IdentityBackend`] with a fixed timeout policy
//! and consistent error extraction. Tokens are attached per call and never
//! stored here.

use super::{
    extract_detail, AuthResponse, BackendError, BackendFuture, CaptureRequest, IdentityBackend,
    LoginRequest, MagicLinkRequest, RegisterRequest,
};
use crate::APP_USER_AGENT;
use reqwest::{header::AUTHORIZATION, Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

pub const DEFAULT_API_PREFIX: &str = "/api/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Maximum number of backend message characters surfaced to the user.
const MAX_ERROR_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: Url,
    pub api_prefix: String,
    pub timeout: Duration,
}

impl BackendConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Full URL for an API path, e.g. `/auth/login`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        build_url(self.base_url.as_str(), &self.api_prefix, path)
    }
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
}

impl HttpBackend {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|err| BackendError::Network(format!("Failed to build client: {err}")))?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        self.config.endpoint(path)
    }

    #[instrument(skip(self, body, bearer))]
    async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&SecretString>,
    ) -> Result<T, BackendError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let request = with_bearer(self.client.post(self.endpoint(path)).json(body), bearer);
        let response = request.send().await.map_err(map_request_error)?;
        handle_json_response(response).await
    }

    #[instrument(skip(self, body, bearer))]
    async fn post_ignoring_body<B>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&SecretString>,
    ) -> Result<(), BackendError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let request = with_bearer(self.client.post(self.endpoint(path)).json(body), bearer);
        let response = request.send().await.map_err(map_request_error)?;
        handle_empty_response(response).await
    }

    #[instrument(skip(self, query))]
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, BackendError> {
        let response = self
            .client
            .get(self.endpoint(path))
            .query(query)
            .send()
            .await
            .map_err(map_request_error)?;
        handle_json_response(response).await
    }
}

impl IdentityBackend for HttpBackend {
    fn register<'a>(&'a self, request: &'a RegisterRequest) -> BackendFuture<'a, AuthResponse> {
        Box::pin(self.post_json("/auth/register", request, None))
    }

    fn login<'a>(&'a self, request: &'a LoginRequest) -> BackendFuture<'a, AuthResponse> {
        Box::pin(self.post_json("/auth/login", request, None))
    }

    fn capture<'a>(
        &'a self,
        access_token: &'a SecretString,
        request: &'a CaptureRequest,
    ) -> BackendFuture<'a, ()> {
        Box::pin(self.post_ignoring_body("/auth/capture", request, Some(access_token)))
    }

    fn request_magic_link<'a>(&'a self, request: &'a MagicLinkRequest) -> BackendFuture<'a, ()> {
        Box::pin(self.post_ignoring_body("/magic_link/request", request, None))
    }

    fn verify_magic_link<'a>(&'a self, token: &'a str) -> BackendFuture<'a, AuthResponse> {
        Box::pin(async move {
            self.get_json("/magic_link/verify", &[("token", token)])
                .await
        })
    }
}

fn with_bearer(request: RequestBuilder, bearer: Option<&SecretString>) -> RequestBuilder {
    match bearer {
        Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token.expose_secret())),
        None => request,
    }
}

/// Join base URL, API prefix and path without doubling slashes.
fn build_url(base_url: &str, prefix: &str, path: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let prefix = prefix.trim().trim_matches('/');
    let path = path.trim().trim_start_matches('/');

    if prefix.is_empty() {
        format!("{base}/{path}")
    } else {
        format!("{base}/{prefix}/{path}")
    }
}

fn map_request_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Network(err.to_string())
    }
}

async fn handle_json_response<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    if response.status().is_success() {
        response
            .json::<T>()
            .await
            .map_err(|err| BackendError::Parse(err.to_string()))
    } else {
        Err(error_from_response(response).await)
    }
}

async fn handle_empty_response(response: Response) -> Result<(), BackendError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(error_from_response(response).await)
    }
}

async fn error_from_response(response: Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<Value>(&body)
        .ok()
        .as_ref()
        .and_then(extract_detail)
        .map(|detail| truncate(&detail));

    debug!(status, has_detail = detail.is_some(), "backend returned an error");

    BackendError::Http { status, detail }
}

fn truncate(message: &str) -> String {
    message.chars().take(MAX_ERROR_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use serde_json::json;
    use std::net::TcpListener;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn backend(server: &MockServer) -> Result<HttpBackend> {
        let config = BackendConfig::new(Url::parse(&server.uri())?);
        Ok(HttpBackend::new(config)?)
    }

    #[test]
    fn build_url_joins_segments() {
        assert_eq!(
            build_url("http://api.tld/", "/api/v1/", "/auth/login"),
            "http://api.tld/api/v1/auth/login"
        );
        assert_eq!(
            build_url("http://api.tld", "", "auth/login"),
            "http://api.tld/auth/login"
        );
    }

    #[test]
    fn truncate_limits_length() {
        let long = "x".repeat(500);
        assert_eq!(truncate(&long).len(), MAX_ERROR_CHARS);
    }

    #[tokio::test]
    async fn register_returns_auth_response() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/auth/register"))
            .and(body_json(json!({ "email": "a@x.com", "full_name": "A" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "access_token": "t1",
                "token_type": "bearer",
                "user_id": 1,
                "email": "a@x.com"
            })))
            .mount(&server)
            .await;

        let response = backend(&server)?
            .register(&RegisterRequest {
                email: "a@x.com".to_string(),
                full_name: "A".to_string(),
            })
            .await?;

        assert_eq!(response.access_token, "t1");
        assert_eq!(response.user_id.as_str(), "1");
        assert_eq!(response.email, "a@x.com");
        Ok(())
    }

    #[tokio::test]
    async fn login_mismatch_carries_detail() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/auth/login"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({ "detail": "Iris verification failed" })),
            )
            .mount(&server)
            .await;

        let result = backend(&server)?
            .login(&LoginRequest {
                email: "a@x.com".to_string(),
                iris_data: "aXJpcw==".to_string(),
            })
            .await;

        let Err(err) = result else {
            bail!("expected login to fail");
        };
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.detail(), Some("Iris verification failed"));
        Ok(())
    }

    #[tokio::test]
    async fn capture_sends_bearer_token() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/auth/capture"))
            .and(header("authorization", "Bearer t1"))
            .and(body_json(json!({ "iris_data": "aXJpcw==" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "message": "Iris captured successfully" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        backend(&server)?
            .capture(
                &SecretString::from("t1".to_string()),
                &CaptureRequest {
                    iris_data: "aXJpcw==".to_string(),
                },
            )
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn verify_expired_link_reports_detail() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/magic_link/verify"))
            .and(query_param("token", "old token"))
            .respond_with(
                ResponseTemplate::new(410).set_body_json(json!({ "detail": "Link expired" })),
            )
            .mount(&server)
            .await;

        let result = backend(&server)?.verify_magic_link("old token").await;
        assert_eq!(
            result.map(|_| ()),
            Err(BackendError::Http {
                status: 410,
                detail: Some("Link expired".to_string())
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn request_magic_link_ignores_body() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/magic_link/request"))
            .and(body_json(json!({ "email": "a@x.com" })))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        backend(&server)?
            .request_magic_link(&MagicLinkRequest {
                email: "a@x.com".to_string(),
            })
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn non_json_error_has_no_detail() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/magic_link/request"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let result = backend(&server)?
            .request_magic_link(&MagicLinkRequest {
                email: "a@x.com".to_string(),
            })
            .await;
        assert_eq!(
            result,
            Err(BackendError::Http {
                status: 502,
                detail: None
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn malformed_success_body_is_parse_error() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/auth/register"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "ok": true })))
            .mount(&server)
            .await;

        let result = backend(&server)?
            .register(&RegisterRequest {
                email: "a@x.com".to_string(),
                full_name: "A".to_string(),
            })
            .await;
        assert!(matches!(result, Err(BackendError::Parse(_))));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_backend_is_network_error() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        drop(listener);

        let config = BackendConfig::new(Url::parse(&format!("http://127.0.0.1:{port}"))?);
        let result = HttpBackend::new(config)?
            .request_magic_link(&MagicLinkRequest {
                email: "a@x.com".to_string(),
            })
            .await;
        assert!(matches!(result, Err(BackendError::Network(_))));
        Ok(())
    }
}
