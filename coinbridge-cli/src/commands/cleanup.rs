//! `coinbridge cleanup`

use anyhow::{Context, Result};
use clap::Args;

use coinbridge_core::cleanup;
use coinbridge_core::store::CleanupReport;
use coinbridge_daemon::{request_cleanup, DaemonError};

use super::Bridge;

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Run the sweep in this process even if a worker is running.
    #[arg(long)]
    pub local: bool,
}

impl CleanupArgs {
    pub fn run(self) -> Result<()> {
        let bridge = Bridge::open()?;

        let report = if self.local {
            sweep_locally(&bridge)?
        } else {
            match request_cleanup(&bridge.home) {
                Ok(data) => serde_json::from_value::<CleanupReport>(data)
                    .context("unexpected cleanup response from worker")?,
                Err(DaemonError::DaemonNotRunning { .. }) => sweep_locally(&bridge)?,
                Err(err) => return Err(err).context("cleanup failed"),
            }
        };

        println!(
            "✓ cleanup removed {} done, {} failed, {} over the row cap",
            report.deleted_done, report.deleted_failed, report.deleted_overflow
        );
        Ok(())
    }
}

fn sweep_locally(bridge: &Bridge) -> Result<CleanupReport> {
    cleanup::sweep(&bridge.store, &bridge.config.retention).context("cleanup failed")
}

