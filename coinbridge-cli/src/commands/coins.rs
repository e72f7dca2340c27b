//! `coinbridge coins push`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use coinbridge_core::SpendableAction;

use super::Bridge;

#[derive(Subcommand, Debug)]
pub enum CoinsCommand {
    /// Queue an update of one player's scoreboard counters.
    Push(PushArgs),
}

#[derive(Args, Debug)]
pub struct PushArgs {
    /// Player name on the game server.
    pub player: String,

    /// Lifetime coins (always written as an absolute value).
    #[arg(long)]
    pub total: i64,

    /// Current spendable balance, written as-is unless `--add` is given.
    #[arg(long)]
    pub spendable: i64,

    /// Apply this delta to the remote spendable counter instead of overwriting it.
    #[arg(long, value_name = "DELTA", allow_hyphen_values = true)]
    pub add: Option<i64>,

    #[arg(long, default_value = "manual")]
    pub reason: String,
}

pub fn run(command: CoinsCommand) -> Result<()> {
    match command {
        CoinsCommand::Push(args) => push(args),
    }
}

fn push(args: PushArgs) -> Result<()> {
    let bridge = Bridge::open()?;
    let action = if args.add.is_some() {
        SpendableAction::Add
    } else {
        SpendableAction::Set
    };

    let event = bridge
        .outbox()
        .queue_player_coins_update(
            &args.player,
            args.total,
            args.spendable,
            &args.reason,
            action,
            args.add,
        )
        .with_context(|| format!("failed to queue update for '{}'", args.player))?;

    println!("✓ queued coin update #{} for '{}'", event.id, args.player);
    Ok(())
}
