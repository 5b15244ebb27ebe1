pub mod backend;
pub mod local;
pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgAction, ArgMatches, ColorChoice, Command,
};

pub const ARG_EMAIL: &str = "email";
pub const ARG_FULL_NAME: &str = "full-name";
pub const ARG_SKIP_ENROLL: &str = "skip-enroll";
pub const ARG_TOKEN: &str = "token";
pub const ARG_PORT: &str = "port";

/// Deepest subcommand matches. Global options are propagated down, so this
/// sees them wherever they were given on the command line.
#[must_use]
pub fn innermost(matches: &ArgMatches) -> &ArgMatches {
    let mut current = matches;
    while let Some((_, sub)) = current.subcommand() {
        current = sub;
    }
    current
}

fn email_arg() -> Arg {
    Arg::new(ARG_EMAIL)
        .short('e')
        .long(ARG_EMAIL)
        .help("Account email address")
        .required(true)
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("iris-auth")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("register")
                .about("Create an account, then enroll an iris image")
                .arg(email_arg())
                .arg(
                    Arg::new(ARG_FULL_NAME)
                        .short('n')
                        .long(ARG_FULL_NAME)
                        .help("Display name")
                        .required(true),
                )
                .arg(
                    Arg::new(ARG_SKIP_ENROLL)
                        .long(ARG_SKIP_ENROLL)
                        .help("Create the account without enrolling an iris image")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("login")
                .about("Log in with an iris capture")
                .arg(email_arg()),
        )
        .subcommand(
            Command::new("magic-link")
                .about("Password-free login by email")
                .subcommand_required(true)
                .subcommand(
                    Command::new("request")
                        .about("Email a sign-in link")
                        .arg(email_arg()),
                )
                .subcommand(
                    Command::new("verify")
                        .about("Sign in with the token from a link")
                        .arg(
                            Arg::new(ARG_TOKEN)
                                .short('t')
                                .long(ARG_TOKEN)
                                .help("Token from the emailed link")
                                .required(true),
                        ),
                ),
        )
        .subcommand(Command::new("whoami").about("Show the current session"))
        .subcommand(Command::new("logout").about("Forget the current session"))
        .subcommand(
            Command::new("relay")
                .about("Serve the capture relay gateway")
                .arg(
                    Arg::new(ARG_PORT)
                        .short('p')
                        .long(ARG_PORT)
                        .help("Port to listen on")
                        .default_value("8080")
                        .env("IRIS_AUTH_PORT")
                        .value_parser(clap::value_parser!(u16)),
                ),
        );

    let command = backend::with_args(command);
    let command = local::with_args(command);
    logging::with_args(command)
}
