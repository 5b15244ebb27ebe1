use super::{interrupt_token, with_progress};
use crate::{cli::globals::GlobalArgs, flow::Coordinator};
use anyhow::Result;
use std::io::Write;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub email: String,
}

/// # Errors
/// Returns an error if the capture or the login fails.
pub async fn execute(args: Args) -> Result<()> {
    let coordinator = args.globals.coordinator().await?;
    run(&args, &coordinator, &interrupt_token(), &mut std::io::stdout()).await
}

pub(crate) async fn run<W: Write>(
    args: &Args,
    coordinator: &Coordinator,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<()> {
    if let Some(session) = coordinator.session().current() {
        writeln!(out, "Already signed in as {}", session.email())?;
        return Ok(());
    }

    let flow = coordinator.login_flow();
    flow.continue_with_email(&args.email)?;

    writeln!(out, "Look into the camera.")?;
    let session = with_progress(coordinator, flow.capture_and_submit(cancel), out).await??;

    writeln!(out, "Signed in as {}", session.email())?;
    Ok(())
}
