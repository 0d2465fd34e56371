use std::time::Duration;

use console::Term;
use csm_dashboard_shared::io::api::OperatorIdentifier;

use crate::scripts::check::{self, Flags};
use crate::scripts::prelude::ScriptRuntime;
use crate::scripts::render::Console;

/// Re-runs `check` every `interval` until Ctrl+C. Failed refreshes are reported and retried
/// on the next tick.
pub async fn run(runtime: &ScriptRuntime, identifier: &OperatorIdentifier, interval: Duration) -> anyhow::Result<()> {
    let term = Term::stdout();
    let flags = Flags::default();
    loop {
        term.clear_screen()?;
        match check::run(runtime, identifier, &flags).await {
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Refresh failed: {e:?}");
                Console::error(&format!("Refresh failed: {e:#}"));
            }
        }
        println!();
        Console::info(
            "Refreshing every",
            &format!("{}s, press Ctrl+C to stop", interval.as_secs()),
        );

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping watch");
                return Ok(());
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
