//! `coinbridge player add|map|list`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use super::{print_json, Bridge};

/// Manage the local primary record of each participant.
#[derive(Subcommand, Debug)]
pub enum PlayerCommand {
    /// Create or replace a player record.
    Add(AddArgs),

    /// Link a player to their name on the game server.
    Map {
        name: String,
        remote: String,
    },

    /// List all players.
    List {
        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub name: String,

    /// Player name on the game server.
    #[arg(long)]
    pub remote: Option<String>,

    #[arg(long, default_value_t = 0)]
    pub total: i64,

    #[arg(long, default_value_t = 0)]
    pub spendable: i64,
}

#[derive(Tabled)]
struct PlayerRow {
    #[tabled(rename = "player")]
    name: String,
    #[tabled(rename = "minecraft")]
    remote: String,
    #[tabled(rename = "total")]
    total: i64,
    #[tabled(rename = "spendable")]
    spendable: i64,
}

pub fn run(cmd: PlayerCommand) -> Result<()> {
    match cmd {
        PlayerCommand::Add(args) => add(args),
        PlayerCommand::Map { name, remote } => map(&name, &remote),
        PlayerCommand::List { json } => list(json),
    }
}

fn add(args: AddArgs) -> Result<()> {
    let bridge = Bridge::open()?;
    let player = bridge
        .store
        .upsert_player(&args.name, args.remote.as_deref(), args.total, args.spendable)
        .with_context(|| format!("failed to save player '{}'", args.name))?;
    println!(
        "✓ saved '{}' ({} total, {} spendable)",
        player.name, player.coins_total, player.coins_spendable
    );
    Ok(())
}

fn map(name: &str, remote: &str) -> Result<()> {
    let bridge = Bridge::open()?;
    let player = bridge
        .store
        .map_remote_name(name, Some(remote))
        .with_context(|| format!("failed to map '{name}'; add the player first"))?;
    println!(
        "✓ '{}' is '{}' on the server",
        player.name,
        player.remote_name.as_deref().unwrap_or("-")
    );
    Ok(())
}

fn list(json: bool) -> Result<()> {
    let bridge = Bridge::open()?;
    let players = bridge
        .store
        .list_players()
        .context("failed to list players")?;

    if json {
        return print_json(&players);
    }
    if players.is_empty() {
        println!("No players.");
        println!("Run: coinbridge player add <name> --remote <minecraft name>");
        return Ok(());
    }

    let rows: Vec<PlayerRow> = players
        .into_iter()
        .map(|p| PlayerRow {
            name: p.name,
            remote: p.remote_name.unwrap_or_else(|| "-".to_string()),
            total: p.coins_total,
            spendable: p.coins_spendable,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}
