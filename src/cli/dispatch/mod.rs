//! Map parsed arguments to an [`Action`].

use crate::cli::{
    actions::{login, magic_link, register, relay, Action},
    commands::{
        self, backend, local, ARG_EMAIL, ARG_FULL_NAME, ARG_PORT, ARG_SKIP_ENROLL, ARG_TOKEN,
    },
    globals::GlobalArgs,
};
use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;

fn required(matches: &ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .with_context(|| format!("missing required argument: --{id}"))
}

fn globals(matches: &ArgMatches) -> Result<GlobalArgs> {
    let mut globals = GlobalArgs::new(backend::parse(matches)?);
    let local = local::Options::parse(matches);
    globals.session_file = local.session_file;
    globals.capture_source = local.capture_source;
    Ok(globals)
}

/// # Errors
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let globals = globals(commands::innermost(matches))?;

    match matches.subcommand() {
        Some(("register", sub)) => Ok(Action::Register(register::Args {
            globals,
            email: required(sub, ARG_EMAIL)?,
            full_name: required(sub, ARG_FULL_NAME)?,
            skip_enroll: sub.get_flag(ARG_SKIP_ENROLL),
        })),
        Some(("login", sub)) => Ok(Action::Login(login::Args {
            globals,
            email: required(sub, ARG_EMAIL)?,
        })),
        Some(("magic-link", sub)) => {
            let step = match sub.subcommand() {
                Some(("request", request)) => magic_link::Step::Request {
                    email: required(request, ARG_EMAIL)?,
                },
                Some(("verify", verify)) => magic_link::Step::Verify {
                    token: required(verify, ARG_TOKEN)?,
                },
                _ => return Err(anyhow!("expected `magic-link request` or `magic-link verify`")),
            };
            Ok(Action::MagicLink(magic_link::Args { globals, step }))
        }
        Some(("whoami", _)) => Ok(Action::WhoAmI(globals)),
        Some(("logout", _)) => Ok(Action::Logout(globals)),
        Some(("relay", sub)) => Ok(Action::Relay(relay::Args {
            globals,
            port: sub.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080),
        })),
        _ => Err(anyhow!(
            "unknown command, see `{} --help`",
            commands::new().get_name()
        )),
    }
}
