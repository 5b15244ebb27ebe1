use crate::{cli::globals::GlobalArgs, flow::Coordinator};
use anyhow::Result;
use std::io::Write;

#[derive(Debug)]
pub enum Step {
    Request { email: String },
    Verify { token: String },
}

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub step: Step,
}

/// # Errors
/// Returns an error if the backend rejects the request or the token.
pub async fn execute(args: Args) -> Result<()> {
    let coordinator = args.globals.coordinator().await?;
    run(&args.step, &coordinator, &mut std::io::stdout()).await
}

pub(crate) async fn run<W: Write>(
    step: &Step,
    coordinator: &Coordinator,
    out: &mut W,
) -> Result<()> {
    let flow = coordinator.magic_link_flow();

    match step {
        Step::Request { email } => {
            flow.request(email).await?;
            writeln!(out, "Check your email: a sign-in link is on its way.")?;
        }
        Step::Verify { token } => {
            let session = flow.verify(token).await?;
            writeln!(out, "Signed in as {}", session.email())?;
        }
    }

    Ok(())
}
