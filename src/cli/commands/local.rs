use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

pub const ARG_SESSION_FILE: &str = "session-file";
pub const ARG_CAPTURE_SOURCE: &str = "capture-source";

#[derive(Debug, Clone, Default)]
pub struct Options {
    pub session_file: Option<PathBuf>,
    pub capture_source: Option<PathBuf>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let path = |id: &str| {
            matches
                .get_one::<String>(id)
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
        };

        Self {
            session_file: path(ARG_SESSION_FILE),
            capture_source: path(ARG_CAPTURE_SOURCE),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_FILE)
                .long(ARG_SESSION_FILE)
                .help("Where the session is kept between runs")
                .long_help(
                    "Where the session is kept between runs. Defaults to session.json in the platform data directory.",
                )
                .env("IRIS_AUTH_SESSION_FILE")
                .global(true),
        )
        .arg(
            Arg::new(ARG_CAPTURE_SOURCE)
                .long(ARG_CAPTURE_SOURCE)
                .help("Image file used as the camera feed (PNG or JPEG)")
                .env("IRIS_AUTH_CAPTURE_SOURCE")
                .global(true),
        )
}
