//! `coinbridge inbound`: one signed message on stdin, one JSON reply on stdout.

use std::io::Read;

use anyhow::{Context, Result};

use coinbridge_core::inbound;

use super::Bridge;

pub fn run() -> Result<()> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("failed to read message from stdin")?;

    let bridge = Bridge::open()?;
    let reply = inbound::handle_message(&bridge.outbox(), &bridge.config.inbound, raw.trim())
        .context("failed to apply inbound message")?;

    println!(
        "{}",
        serde_json::to_string(&reply).context("failed to render reply")?
    );
    Ok(())
}
