use super::{interrupt_token, with_progress};
use crate::{
    cli::globals::GlobalArgs,
    flow::{Coordinator, FlowError},
};
use anyhow::{anyhow, Result};
use std::io::Write;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub email: String,
    pub full_name: String,
    pub skip_enroll: bool,
}

/// # Errors
/// Returns an error if account creation or enrollment fails.
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

    let flow = coordinator.register_flow();
    let session = flow.submit(&args.email, &args.full_name).await?;
    writeln!(out, "Account created for {}", session.email())?;

    if args.skip_enroll {
        flow.skip_enrollment()?;
        writeln!(out, "Signed in as {} (no iris enrolled)", session.email())?;
        return Ok(());
    }

    writeln!(out, "Look into the camera to enroll your iris.")?;
    match with_progress(coordinator, flow.enroll(cancel), out).await? {
        Ok(()) => {
            writeln!(out, "Iris enrolled. Signed in as {}", session.email())?;
            Ok(())
        }
        Err(FlowError::Cancelled) => {
            writeln!(out, "Enrollment skipped. Signed in as {}", session.email())?;
            Ok(())
        }
        Err(err) => Err(anyhow!(
            "Signed in as {}, but iris enrollment failed: {err}",
            session.email()
        )),
    }
}
