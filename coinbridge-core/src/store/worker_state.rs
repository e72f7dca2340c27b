//! The singleton `worker_state` row.
//!
//! Writers never overwrite blindly: each write carries the `version` it read
//! and only lands if nobody wrote in between. The worker's event loop and its
//! health probe both write this row, so a blind write would drop heartbeats.

use rusqlite::{params, Connection};

use super::{from_millis, to_millis, Store};
use crate::error::StoreError;
use crate::types::WorkerState;

const MAX_CAS_ATTEMPTS: u32 = 8;

fn fetch_state(conn: &Connection) -> Result<WorkerState, StoreError> {
    let state = conn.query_row(
        "SELECT is_running, pid, started_at, last_heartbeat, last_error, version
         FROM worker_state WHERE id = 1",
        [],
        |row| {
            let pid: Option<i64> = row.get(1)?;
            let started_at: Option<i64> = row.get(2)?;
            let last_heartbeat: Option<i64> = row.get(3)?;
            Ok(WorkerState {
                is_running: row.get(0)?,
                pid: pid.and_then(|p| u32::try_from(p).ok()),
                started_at: started_at.map(from_millis),
                last_heartbeat: last_heartbeat.map(from_millis),
                last_error: row.get(4)?,
                version: row.get(5)?,
            })
        },
    )?;
    Ok(state)
}

impl Store {
    pub fn load_worker_state(&self) -> Result<WorkerState, StoreError> {
        let conn = self.lock()?;
        fetch_state(&conn)
    }

    /// Write `state` only if the stored row still has `state.version`.
    ///
    /// Returns the written state (with its bumped version), or `None` if
    /// another writer got there first.
    pub fn swap_worker_state(&self, state: &WorkerState) -> Result<Option<WorkerState>, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE worker_state
             SET is_running = ?1, pid = ?2, started_at = ?3, last_heartbeat = ?4,
                 last_error = ?5, version = version + 1
             WHERE id = 1 AND version = ?6",
            params![
                state.is_running,
                state.pid.map(i64::from),
                state.started_at.map(to_millis),
                state.last_heartbeat.map(to_millis),
                state.last_error,
                state.version
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        Ok(Some(WorkerState {
            version: state.version + 1,
            ..state.clone()
        }))
    }

    /// Read, apply `mutate`, and compare-and-swap; re-read and retry on a lost race.
    pub fn update_worker_state(
        &self,
        mut mutate: impl FnMut(&mut WorkerState),
    ) -> Result<WorkerState, StoreError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let mut state = self.load_worker_state()?;
            mutate(&mut state);
            if let Some(written) = self.swap_worker_state(&state)? {
                return Ok(written);
            }
        }
        Err(StoreError::StateContention {
            attempts: MAX_CAS_ATTEMPTS,
        })
    }
}
