use crate::backend::{http::DEFAULT_API_PREFIX, BackendConfig};
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;
use url::Url;

pub const ARG_BACKEND_URL: &str = "backend-url";
pub const ARG_API_PREFIX: &str = "api-prefix";
pub const ARG_TIMEOUT_MS: &str = "timeout-ms";

/// Build the backend configuration from matches.
///
/// # Errors
/// Returns an error if the URL is missing or malformed.
pub fn parse(matches: &ArgMatches) -> Result<BackendConfig> {
    let url = matches
        .get_one::<String>(ARG_BACKEND_URL)
        .context("missing required argument: --backend-url")?;
    let base_url = Url::parse(url).with_context(|| format!("invalid backend URL: {url}"))?;

    let mut config = BackendConfig::new(base_url);
    if let Some(prefix) = matches.get_one::<String>(ARG_API_PREFIX) {
        config.api_prefix.clone_from(prefix);
    }
    if let Some(timeout) = matches.get_one::<u64>(ARG_TIMEOUT_MS) {
        config.timeout = Duration::from_millis(*timeout);
    }

    Ok(config)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BACKEND_URL)
                .long(ARG_BACKEND_URL)
                .help("Identity backend base URL")
                .default_value("http://localhost:8000")
                .env("IRIS_AUTH_BACKEND_URL")
                .global(true),
        )
        .arg(
            Arg::new(ARG_API_PREFIX)
                .long(ARG_API_PREFIX)
                .help("Path prefix of the backend API")
                .default_value(DEFAULT_API_PREFIX)
                .env("IRIS_AUTH_API_PREFIX")
                .global(true),
        )
        .arg(
            Arg::new(ARG_TIMEOUT_MS)
                .long(ARG_TIMEOUT_MS)
                .help("Backend request timeout in milliseconds")
                .default_value("10000")
                .env("IRIS_AUTH_TIMEOUT_MS")
                .global(true)
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
