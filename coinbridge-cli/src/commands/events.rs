//! `coinbridge events list|show|requeue`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use coinbridge_core::{EventId, EventStatus};

use super::{print_json, Bridge};

#[derive(Subcommand, Debug)]
pub enum EventsCommand {
    /// List outbox events, newest first.
    List(ListArgs),
    /// Print one event with its payload.
    Show {
        id: i64,
    },
    /// Append a fresh pending copy of a failed or stuck event.
    Requeue {
        id: i64,
    },
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only events in this status: pending | processing | done | failed.
    #[arg(long)]
    pub status: Option<EventStatus>,

    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "id")]
    id: i64,
    #[tabled(rename = "type")]
    event_type: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "attempts")]
    attempts: u32,
    #[tabled(rename = "created")]
    created: String,
    #[tabled(rename = "error")]
    error: String,
}

pub fn run(command: EventsCommand) -> Result<()> {
    match command {
        EventsCommand::List(args) => list(args),
        EventsCommand::Show { id } => show(EventId(id)),
        EventsCommand::Requeue { id } => requeue(EventId(id)),
    }
}

fn list(args: ListArgs) -> Result<()> {
    let bridge = Bridge::open()?;
    let events = bridge
        .store
        .list_events(args.status, args.limit)
        .context("failed to list events")?;

    if args.json {
        return print_json(&events);
    }
    if events.is_empty() {
        println!("No events.");
        return Ok(());
    }

    let counts = bridge
        .store
        .count_by_status()
        .context("failed to count events")?;
    println!(
        "{} pending | {} processing | {} done | {} failed",
        counts.pending, counts.processing, counts.done, counts.failed
    );

    let rows: Vec<EventRow> = events
        .into_iter()
        .map(|e| EventRow {
            id: e.id.0,
            event_type: e.event_type,
            status: status_label(e.status),
            attempts: e.attempts,
            created: e.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            error: shorten(&e.last_error, 60),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn show(id: EventId) -> Result<()> {
    let bridge = Bridge::open()?;
    let event = bridge
        .store
        .get_event(id)
        .with_context(|| format!("event #{id} not found"))?;
    print_json(&event)
}

fn requeue(id: EventId) -> Result<()> {
    let bridge = Bridge::open()?;
    let event = bridge
        .outbox()
        .requeue(id)
        .with_context(|| format!("failed to requeue event #{id}"))?;
    println!("✓ requeued #{id} as #{}", event.id);
    Ok(())
}

fn status_label(status: EventStatus) -> String {
    match status {
        EventStatus::Pending => status.as_str().yellow().to_string(),
        EventStatus::Processing => status.as_str().cyan().to_string(),
        EventStatus::Done => status.as_str().green().to_string(),
        EventStatus::Failed => status.as_str().red().bold().to_string(),
    }
}

fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
