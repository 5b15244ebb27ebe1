use crate::cli::actions::{login, magic_link, register, relay, session, Action};
use anyhow::Result;

/// Single dispatch point for all CLI actions.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Register(args) => register::execute(args).await,
        Action::Login(args) => login::execute(args).await,
        Action::MagicLink(args) => magic_link::execute(args).await,
        Action::WhoAmI(globals) => session::whoami(globals).await,
        Action::Logout(globals) => session::logout(globals).await,
        Action::Relay(args) => relay::execute(args).await,
    }
}
