pub mod login;
pub mod magic_link;
pub mod register;
pub mod relay;
pub mod session;

mod run;

use crate::{capture::CaptureState, cli::globals::GlobalArgs, flow::Coordinator};
use anyhow::Result;
use std::{future::Future, io::Write};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug)]
pub enum Action {
    Register(register::Args),
    Login(login::Args),
    MagicLink(magic_link::Args),
    WhoAmI(GlobalArgs),
    Logout(GlobalArgs),
    Relay(relay::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        run::execute(self).await
    }
}

/// Token cancelled on Ctrl-C, so an interrupted capture releases the camera.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupted");
            trigger.cancel();
        }
    });
    token
}

/// Drive `work` to completion while printing capture progress to `out`.
async fn with_progress<T, W: Write>(
    coordinator: &Coordinator,
    work: impl Future<Output = T>,
    out: &mut W,
) -> Result<T> {
    let mut progress = coordinator.subscribe_capture();
    tokio::pin!(work);

    loop {
        tokio::select! {
            result = &mut work => return Ok(result),
            Ok(()) = progress.changed() => {
                let state = progress.borrow_and_update().clone();
                render(&state, out)?;
            }
        }
    }
}

fn render<W: Write>(state: &CaptureState, out: &mut W) -> std::io::Result<()> {
    match state {
        CaptureState::AwaitingDevice => writeln!(out, "Opening camera..."),
        CaptureState::CountingDown(remaining) if *remaining > 0 => {
            writeln!(out, "Capturing in {remaining}...")
        }
        _ => Ok(()),
    }
}
