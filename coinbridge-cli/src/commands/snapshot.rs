//! `coinbridge snapshot refresh|list`

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use coinbridge_daemon::{request_refresh, DaemonError, Reconciler};
use coinbridge_rcon::Console;

use super::{print_json, Bridge};

#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    /// Read every mapped player's scores from the server now.
    Refresh,
    /// Show the cached scoreboard values.
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "player")]
    player: String,
    #[tabled(rename = "total")]
    total: i64,
    #[tabled(rename = "spendable")]
    spendable: i64,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "captured")]
    captured: String,
}

pub fn run(command: SnapshotCommand) -> Result<()> {
    match command {
        SnapshotCommand::Refresh => refresh(),
        SnapshotCommand::List(args) => list(args),
    }
}

fn refresh() -> Result<()> {
    let bridge = Bridge::open()?;

    let updated = match request_refresh(&bridge.home) {
        Ok(data) => data.get("updated").and_then(|v| v.as_u64()).unwrap_or(0) as usize,
        Err(DaemonError::DaemonNotRunning { .. }) => {
            let console: Arc<dyn Console> = Arc::new(bridge.rcon_client());
            Reconciler::new(
                bridge.store.clone(),
                console,
                bridge.config.scoreboard.clone(),
                &bridge.config.snapshot,
            )
            .refresh()
            .context("snapshot refresh failed")?
        }
        Err(err) => return Err(err).context("snapshot refresh failed"),
    };

    println!("✓ refreshed {updated} snapshot(s)");
    Ok(())
}

fn list(args: ListArgs) -> Result<()> {
    let bridge = Bridge::open()?;
    let snapshots = bridge
        .store
        .list_snapshots()
        .context("failed to read snapshots")?;

    if args.json {
        return print_json(&snapshots);
    }
    if snapshots.is_empty() {
        println!("No snapshots yet. Run: coinbridge snapshot refresh");
        return Ok(());
    }

    let rows: Vec<SnapshotRow> = snapshots
        .into_iter()
        .map(|s| SnapshotRow {
            player: s.player_name,
            total: s.coins_total,
            spendable: s.coins_spendable,
            source: s.source.as_str().to_string(),
            captured: s.captured_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", "Scoreboard snapshots".bold());
    println!("{table}");
    Ok(())
}
