use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RconError;

/// How deep a connection check goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    /// Log in and run `list`.
    #[default]
    Auth,
    /// Only open a TCP connection.
    Port,
}

impl fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeMode::Auth => f.write_str("auth"),
            ProbeMode::Port => f.write_str("port"),
        }
    }
}

/// Outcome of a reachability probe. Never an `Err`: failure is data here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionCheck {
    pub ok: bool,
    pub error: String,
    pub mode: ProbeMode,
}

impl ConnectionCheck {
    pub fn passed(mode: ProbeMode) -> Self {
        Self {
            ok: true,
            error: String::new(),
            mode,
        }
    }

    pub fn failed(mode: ProbeMode, error: impl fmt::Display) -> Self {
        Self {
            ok: false,
            error: error.to_string(),
            mode,
        }
    }
}

/// The scoreboard operations the bridge needs from the game server.
///
/// [`RconClient`](crate::RconClient) is the real implementation; tests
/// substitute a recording fake.
pub trait Console: Send + Sync {
    /// Create a dummy objective. Succeeds when it already exists.
    fn ensure_objective(&self, name: &str, display: &str) -> Result<(), RconError>;

    fn set_score(&self, player: &str, objective: &str, value: i64) -> Result<(), RconError>;

    /// Move a score by `delta`, which may be negative.
    fn add_score(&self, player: &str, objective: &str, delta: i64) -> Result<(), RconError>;

    /// `None` when the server has no value for the player.
    fn get_score(&self, player: &str, objective: &str) -> Result<Option<i64>, RconError>;

    fn check_connection(&self, mode: ProbeMode) -> ConnectionCheck;
}
