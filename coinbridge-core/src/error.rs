//! Error types for coinbridge-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{EventId, EventStatus};

/// Errors raised while locating or parsing `config.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.coinbridge/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Storage-layer failures: claim, commit, upsert or query against the database.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A JSON column could not be encoded or decoded.
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("event {0} not found")]
    EventNotFound(EventId),

    #[error("player '{0}' not found")]
    PlayerNotFound(String),

    /// A status column held a value outside the known set.
    #[error("unknown event status '{0}' in database")]
    UnknownStatus(String),

    /// Only failed or stuck events may be re-delivered.
    #[error("event {id} is {status} and cannot be requeued")]
    NotRequeueable { id: EventId, status: EventStatus },

    /// The worker state row kept changing underneath a compare-and-swap.
    #[error("worker state update lost {attempts} compare-and-swap races")]
    StateContention { attempts: u32 },

    /// The store's connection mutex was poisoned by a panicking holder.
    #[error("store connection lock poisoned")]
    Poisoned,
}

/// A stored event whose type or payload cannot be executed.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unsupported event type '{0}'")]
    UnknownEventType(String),

    #[error("malformed {event_type} payload: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing player in payload")]
    MissingPlayer,
}

pub(crate) fn config_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn store_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
