//! Minimal Source-RCON client for driving a game server's scoreboard.
//!
//! - [`packet`]: wire framing
//! - [`RconClient`]: one connection per command, blocking I/O with timeouts
//! - [`Console`]: the scoreboard operations the bridge depends on

mod client;
mod console;
mod error;
pub mod packet;

pub use client::{parse_score, RconClient, PORT_PROBE_TIMEOUT};
pub use console::{ConnectionCheck, Console, ProbeMode};
pub use error::RconError;
