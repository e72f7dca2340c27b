use std::path::PathBuf;

use thiserror::Error;

use coinbridge_core::{ConfigError, StoreError, ValidationError};
use coinbridge_rcon::RconError;

/// Error surface for the daemon runtime and its control protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("RCON error: {0}")]
    Rcon(#[from] RconError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event execution failed: {0}")]
    Execute(#[from] ExecuteError),

    #[error("{task} task did not complete: {source}")]
    Join {
        task: String,
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },
}

/// Why one event could not be executed. Recorded on the event, never
/// propagated past it.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("RCON error: {0}")]
    Transport(#[from] RconError),

    #[error("invalid event: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

pub(crate) fn join_err(task: impl Into<String>, source: tokio::task::JoinError) -> DaemonError {
    DaemonError::Join {
        task: task.into(),
        source,
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
