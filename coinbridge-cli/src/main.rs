//! Coinbridge: push earned coins to a Minecraft scoreboard over RCON.
//!
//! # Usage
//!
//! ```text
//! coinbridge worker start|stop|status
//! coinbridge sync [--reason <text>]
//! coinbridge coins push <player> --total N --spendable N [--add DELTA] [--reason <text>]
//! coinbridge snapshot refresh|list
//! coinbridge rcon test [--port-only]
//! coinbridge cleanup
//! coinbridge events list [--status S] [--limit N] [--json]
//! coinbridge events show|requeue <id>
//! coinbridge player add|map|list
//! coinbridge inbound < message.json
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    cleanup::CleanupArgs, coins::CoinsCommand, events::EventsCommand, player::PlayerCommand,
    rcon::RconCommand, snapshot::SnapshotCommand, sync::SyncArgs, worker::WorkerCommand,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "coinbridge",
    version,
    about = "Deliver coin balances to a Minecraft server through a durable outbox",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run, stop or inspect the outbox worker.
    Worker {
        #[command(subcommand)]
        command: WorkerCommand,
    },

    /// Queue a full resync of every mapped player.
    Sync(SyncArgs),

    /// Queue coin updates for one player.
    Coins {
        #[command(subcommand)]
        command: CoinsCommand,
    },

    /// Read or refresh the cached scoreboard values.
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommand,
    },

    /// Check the RCON connection.
    Rcon {
        #[command(subcommand)]
        command: RconCommand,
    },

    /// Delete old outbox rows according to the retention policy.
    Cleanup(CleanupArgs),

    /// Inspect and requeue outbox events.
    Events {
        #[command(subcommand)]
        command: EventsCommand,
    },

    /// Manage local player records.
    Player {
        #[command(subcommand)]
        command: PlayerCommand,
    },

    /// Verify and apply one signed message from the game server (read from stdin).
    Inbound,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    coinbridge_daemon::init_tracing();
    match cli.command {
        Commands::Worker { command } => commands::worker::run(command),
        Commands::Sync(args) => args.run(),
        Commands::Coins { command } => commands::coins::run(command),
        Commands::Snapshot { command } => commands::snapshot::run(command),
        Commands::Rcon { command } => commands::rcon::run(command),
        Commands::Cleanup(args) => args.run(),
        Commands::Events { command } => commands::events::run(command),
        Commands::Player { command } => commands::player::run(command),
        Commands::Inbound => commands::inbound::run(),
    }
}
