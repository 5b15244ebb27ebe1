use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";

const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Accepts a level name or its index in `LEVEL_NAMES`, so
/// `IRIS_AUTH_LOG_LEVEL=debug` and `-vvv` mean the same thing.
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(|raw: &str| -> Result<u8, String> {
        let raw = raw.trim().to_ascii_lowercase();
        if let Ok(count) = raw.parse::<u8>() {
            return if usize::from(count) < LEVEL_NAMES.len() {
                Ok(count)
            } else {
                Err(format!("log level must be below {}", LEVEL_NAMES.len()))
            };
        }
        LEVEL_NAMES
            .iter()
            .position(|name| *name == raw)
            .and_then(|index| u8::try_from(index).ok())
            .ok_or_else(|| format!("invalid log level, expected one of {}", LEVEL_NAMES.join(", ")))
    })
}

/// Level for a verbosity count; `None` keeps the subscriber default.
#[must_use]
pub const fn level_for(verbosity: u8) -> Option<Level> {
    match verbosity {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

/// Reads the verbosity wherever it was given on the command line.
#[must_use]
pub fn level(matches: &ArgMatches) -> Option<Level> {
    level_for(
        super::innermost(matches)
            .get_one::<u8>(ARG_VERBOSITY)
            .copied()
            .unwrap_or(0),
    )
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("IRIS_AUTH_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
