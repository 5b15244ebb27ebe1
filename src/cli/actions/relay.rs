use crate::cli::globals::GlobalArgs;
use anyhow::Result;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub port: u16,
}

/// Serve the relay gateway until Ctrl-C.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    info!(
        "Starting relay for backend {}",
        args.globals.backend.base_url
    );
    crate::relay::new(args.port, args.globals.backend).await
}
