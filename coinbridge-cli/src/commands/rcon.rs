//! `coinbridge rcon test`

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use coinbridge_rcon::{Console, ProbeMode};

use super::Bridge;

#[derive(Subcommand, Debug)]
pub enum RconCommand {
    /// Connect to the server and report whether it answers.
    Test(TestArgs),
}

#[derive(Args, Debug)]
pub struct TestArgs {
    /// Only check that the port accepts TCP connections; skip the login.
    #[arg(long)]
    pub port_only: bool,
}

pub fn run(command: RconCommand) -> Result<()> {
    match command {
        RconCommand::Test(args) => test(args),
    }
}

fn test(args: TestArgs) -> Result<()> {
    let bridge = Bridge::open()?;
    let client = bridge.rcon_client();
    let mode = if args.port_only {
        ProbeMode::Port
    } else {
        ProbeMode::Auth
    };

    let check = client.check_connection(mode);
    if check.ok {
        println!(
            "{} {} ({} check)",
            "✓".green().bold(),
            client.address(),
            check.mode
        );
        Ok(())
    } else {
        println!(
            "{} {} ({} check): {}",
            "✗".red().bold(),
            client.address(),
            check.mode,
            check.error
        );
        Err(anyhow::anyhow!("RCON connection test failed"))
    }
}
