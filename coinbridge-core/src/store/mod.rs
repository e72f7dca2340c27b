//! SQLite-backed durable store.
//!
//! One database file holds four tables:
//!
//! - `outbox_events`: the ordered intent queue ([`outbox`])
//! - `players`: the local primary record ([`players`])
//! - `scoreboard_snapshots`: cached remote counters ([`snapshots`])
//! - `worker_state`: the worker's singleton liveness row ([`worker_state`])
//!
//! Every process (CLI producer, daemon) opens its own [`Store`]; SQLite's
//! file locking is the only coordination between them. Timestamps are stored
//! as Unix milliseconds so range predicates compare integers.

pub mod outbox;
pub mod players;
pub mod snapshots;
pub mod worker_state;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::{store_io_err, StoreError};

pub use outbox::{CleanupReport, StatusCounts};
pub use players::SpendOutcome;

/// How long a writer waits for another process's lock before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS outbox_events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type    TEXT    NOT NULL,
    payload       TEXT    NOT NULL,
    status        TEXT    NOT NULL DEFAULT 'pending',
    attempts      INTEGER NOT NULL DEFAULT 0,
    last_error    TEXT    NOT NULL DEFAULT '',
    created_at    INTEGER NOT NULL,
    processed_at  INTEGER
);
CREATE INDEX IF NOT EXISTS idx_outbox_status_created
    ON outbox_events (status, created_at, id);

CREATE TABLE IF NOT EXISTS players (
    name             TEXT    PRIMARY KEY COLLATE NOCASE,
    remote_name      TEXT    UNIQUE COLLATE NOCASE,
    coins_total      INTEGER NOT NULL DEFAULT 0 CHECK (coins_total >= 0),
    coins_spendable  INTEGER NOT NULL DEFAULT 0 CHECK (coins_spendable >= 0),
    updated_at       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS scoreboard_snapshots (
    player_name      TEXT    PRIMARY KEY COLLATE NOCASE,
    coins_total      INTEGER NOT NULL CHECK (coins_total >= 0),
    coins_spendable  INTEGER NOT NULL CHECK (coins_spendable >= 0),
    source           TEXT    NOT NULL,
    captured_at      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS worker_state (
    id              INTEGER PRIMARY KEY CHECK (id = 1),
    is_running      INTEGER NOT NULL DEFAULT 0,
    pid             INTEGER,
    started_at      INTEGER,
    last_heartbeat  INTEGER,
    last_error      TEXT    NOT NULL DEFAULT '',
    version         INTEGER NOT NULL DEFAULT 0
);
INSERT OR IGNORE INTO worker_state (id) VALUES (1);
"#;

/// Handle to the bridge database.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| store_io_err(dir, e))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::bootstrap(conn)
    }

    /// Private in-memory database, used by tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_parent_dirs_and_is_reopenable() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("nested").join("bridge.db");
        {
            let store = Store::open(&path).expect("open");
            store.upsert_player("alice", Some("Alice_MC"), 10, 5).expect("player");
        }
        let reopened = Store::open(&path).expect("reopen");
        let player = reopened.get_player("ALICE").expect("get").expect("present");
        assert_eq!(player.remote_name.as_deref(), Some("Alice_MC"));
    }

    #[test]
    fn millis_roundtrip_keeps_precision() {
        let now = Utc::now();
        let back = from_millis(to_millis(now));
        assert_eq!(back.timestamp_millis(), now.timestamp_millis());
    }
}
