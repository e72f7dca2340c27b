use std::io;

use thiserror::Error;

/// Transport-level failure talking to the game server.
#[derive(Debug, Error)]
pub enum RconError {
    #[error("RCON I/O error: {0}")]
    Io(io::Error),

    /// Connect, read or write exceeded the configured timeout.
    #[error("RCON timed out: {0}")]
    Timeout(io::Error),

    #[error("RCON authentication rejected (check the password)")]
    AuthRejected,

    #[error("RCON protocol error: {0}")]
    Protocol(String),

    #[error("could not resolve RCON address {0}")]
    Resolve(String),

    /// A command argument would change the shape of the command line.
    #[error("invalid RCON argument '{0}'")]
    InvalidArgument(String),
}

impl From<io::Error> for RconError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => RconError::Timeout(err),
            _ => RconError::Io(err),
        }
    }
}
