//! `coinbridge worker`: daemon lifecycle.

use anyhow::{Context, Result};
use clap::Subcommand;

use coinbridge_daemon::paths::control_socket_path;
use coinbridge_daemon::{request_status, request_stop, start_blocking, DaemonError};

use super::{print_json, Bridge};

#[derive(Subcommand, Debug)]
pub enum WorkerCommand {
    /// Run the worker in the foreground until ctrl-c or `worker stop`.
    Start,
    /// Ask a running worker to shut down after its current event.
    Stop,
    /// Print worker state and outbox counts as JSON.
    Status,
}

pub fn run(command: WorkerCommand) -> Result<()> {
    let home = dirs::home_dir().context("could not determine home directory")?;

    match command {
        WorkerCommand::Start => {
            start_blocking(&home).context("worker exited with error")?;
        }
        WorkerCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("worker stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => println!("worker is not running"),
            Err(err) => return Err(err).context("failed to stop worker"),
        },
        WorkerCommand::Status => match request_status(&home) {
            Ok(status) => print_json(&status)?,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                // The state row may still say running if the last worker crashed.
                let bridge = Bridge::open()?;
                let state = bridge
                    .store
                    .load_worker_state()
                    .context("failed to read worker state")?;
                let counts = bridge
                    .store
                    .count_by_status()
                    .context("failed to count events")?;
                print_json(&serde_json::json!({
                    "running": false,
                    "control_socket": control_socket_path(&home).display().to_string(),
                    "worker": state,
                    "events": counts,
                }))?;
            }
            Err(err) => return Err(err).context("failed to query worker status"),
        },
    }

    Ok(())
}
