//! `coinbridge sync`: queue a full resync.

use anyhow::{Context, Result};
use clap::Args;

use coinbridge_daemon::{request_sync, DaemonError};

use super::Bridge;

/// Arguments for `coinbridge sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Free-text reason stored with the event.
    #[arg(long, default_value = "manual")]
    pub reason: String,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;

        match request_sync(&home, Some(self.reason.clone())) {
            Ok(data) => {
                let id = data.get("event_id").cloned().unwrap_or_default();
                println!("✓ queued full sync #{id} (worker notified)");
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let bridge = Bridge::open()?;
                let event = bridge
                    .outbox()
                    .queue_full_sync(&self.reason)
                    .context("failed to queue full sync")?;
                println!(
                    "✓ queued full sync #{} (worker not running; it will run on next start)",
                    event.id
                );
            }
            Err(err) => return Err(err).context("failed to queue full sync"),
        }
        Ok(())
    }
}
