//! # iris-auth (Biometric & Magic-Link Authentication Client)
//!
//! `iris-auth` authenticates users against a remote identity backend using an
//! iris capture, a password-free magic link, and a locally held session.
//!
//! ## Components
//!
//! - **Capture:** a camera adapter and a countdown-driven state machine that
//!   turns a live stream into one JPEG payload. The device is released on
//!   every exit path.
//! - **Flows:** register (account then enrollment), biometric login, and
//!   magic-link request/verify. Each flow instance allows at most one backend
//!   call in flight.
//! - **Session:** a single process-wide session with restore, establish, and
//!   clear. Restoration happens before any flow runs.
//! - **Relay:** an HTTP pass-through for capture submissions that keeps the
//!   caller's bearer credential and mirrors the backend's answer.
//!
//! ## Partial failure
//!
//! Account creation and biometric enrollment are not transactional. A failed
//! enrollment leaves the freshly created session in place.

pub mod backend;
pub mod capture;
pub mod cli;
pub mod flow;
pub mod relay;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
