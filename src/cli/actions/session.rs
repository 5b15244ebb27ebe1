use crate::{cli::globals::GlobalArgs, flow::Coordinator};
use anyhow::Result;
use std::io::Write;

/// # Errors
/// Returns an error if the session store cannot be opened.
pub async fn whoami(globals: GlobalArgs) -> Result<()> {
    let coordinator = globals.coordinator().await?;
    print_identity(&coordinator, &mut std::io::stdout())
}

/// # Errors
/// Returns an error if the session store cannot be opened.
pub async fn logout(globals: GlobalArgs) -> Result<()> {
    let coordinator = globals.coordinator().await?;
    sign_out(&coordinator, &mut std::io::stdout()).await
}

fn print_identity<W: Write>(coordinator: &Coordinator, out: &mut W) -> Result<()> {
    match coordinator.session().current() {
        Some(session) => writeln!(
            out,
            "Signed in as {} (user {})",
            session.email(),
            session.user_id()
        )?,
        None => writeln!(out, "Not signed in")?,
    }
    Ok(())
}

async fn sign_out<W: Write>(coordinator: &Coordinator, out: &mut W) -> Result<()> {
    if coordinator.session().is_authenticated() {
        coordinator.logout().await;
        writeln!(out, "Signed out")?;
    } else {
        writeln!(out, "Not signed in")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capture::device::testing::FakeDevice,
        flow::test_support::{coordinator, ScriptedBackend},
        session::{Session, UserId},
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn whoami_then_logout() -> Result<()> {
        let backend = Arc::new(ScriptedBackend::default());
        let coordinator = coordinator(&backend, &FakeDevice::working());
        coordinator
            .session()
            .establish(Session::new("t1", UserId::from(1), "a@x.com"))
            .await;

        let mut out = Vec::new();
        print_identity(&coordinator, &mut out)?;
        sign_out(&coordinator, &mut out).await?;
        print_identity(&coordinator, &mut out)?;
        sign_out(&coordinator, &mut out).await?;

        assert_eq!(
            String::from_utf8(out)?,
            "Signed in as a@x.com (user 1)\nSigned out\nNot signed in\nNot signed in\n"
        );
        Ok(())
    }
}
