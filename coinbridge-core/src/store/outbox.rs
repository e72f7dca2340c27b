//! The `outbox_events` table.
//!
//! Producers only ever insert. The worker is the only writer of `status`, and
//! every status write is guarded by the status it expects to replace, so a row
//! can move `pending → processing → done | failed` and nowhere else.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{from_millis, to_millis, Store};
use crate::error::StoreError;
use crate::types::{truncate_error, Event, EventId, EventKind, EventStatus};

const EVENT_COLUMNS: &str =
    "id, event_type, payload, status, attempts, last_error, created_at, processed_at";

/// Row counts per status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub processing: u64,
    pub done: u64,
    pub failed: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.done + self.failed
    }
}

/// Rows removed by one retention sweep, per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub deleted_done: usize,
    pub deleted_failed: usize,
    pub deleted_overflow: usize,
}

struct RawEvent {
    id: i64,
    event_type: String,
    payload: String,
    status: String,
    attempts: i64,
    last_error: String,
    created_at: i64,
    processed_at: Option<i64>,
}

fn raw_event(row: &Row<'_>) -> rusqlite::Result<RawEvent> {
    Ok(RawEvent {
        id: row.get(0)?,
        event_type: row.get(1)?,
        payload: row.get(2)?,
        status: row.get(3)?,
        attempts: row.get(4)?,
        last_error: row.get(5)?,
        created_at: row.get(6)?,
        processed_at: row.get(7)?,
    })
}

impl RawEvent {
    fn into_event(self) -> Result<Event, StoreError> {
        let status = self
            .status
            .parse::<EventStatus>()
            .map_err(|_| StoreError::UnknownStatus(self.status.clone()))?;
        // A payload that is not JSON is kept as a string; decoding it at
        // execution time fails that one event rather than this query.
        let payload = serde_json::from_str(&self.payload).unwrap_or(Value::String(self.payload));
        Ok(Event {
            id: EventId(self.id),
            event_type: self.event_type,
            payload,
            status,
            attempts: u32::try_from(self.attempts).unwrap_or(u32::MAX),
            last_error: self.last_error,
            created_at: from_millis(self.created_at),
            processed_at: self.processed_at.map(from_millis),
        })
    }
}

fn fetch_event(conn: &Connection, id: EventId) -> Result<Event, StoreError> {
    let raw = conn
        .query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM outbox_events WHERE id = ?1"),
            params![id.0],
            raw_event,
        )
        .optional()?
        .ok_or(StoreError::EventNotFound(id))?;
    raw.into_event()
}

fn insert_raw(
    conn: &Connection,
    event_type: &str,
    payload: &str,
    at: DateTime<Utc>,
) -> Result<EventId, StoreError> {
    conn.execute(
        "INSERT INTO outbox_events (event_type, payload, status, created_at)
         VALUES (?1, ?2, 'pending', ?3)",
        params![event_type, payload, to_millis(at)],
    )?;
    Ok(EventId(conn.last_insert_rowid()))
}

impl Store {
    /// Append a pending event created at `at`.
    pub fn insert_event(&self, kind: &EventKind, at: DateTime<Utc>) -> Result<Event, StoreError> {
        let payload = serde_json::to_string(&kind.to_payload()?)?;
        let conn = self.lock()?;
        let id = insert_raw(&conn, kind.event_type().as_str(), &payload, at)?;
        fetch_event(&conn, id)
    }

    /// Claim the oldest pending event: mark it `processing` and bump `attempts`.
    ///
    /// SQLite has no `SKIP LOCKED`; the immediate transaction takes the write
    /// lock before the select, and the update only succeeds while the row is
    /// still `pending`, so two claimers can never return the same row.
    pub fn claim_next(&self) -> Result<Option<Event>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let candidate: Option<i64> = tx
            .query_row(
                "SELECT id FROM outbox_events
                 WHERE status = 'pending'
                 ORDER BY created_at ASC, id ASC
                 LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = candidate else {
            tx.commit()?;
            return Ok(None);
        };

        let claimed = tx.execute(
            "UPDATE outbox_events
             SET status = 'processing', attempts = attempts + 1
             WHERE id = ?1 AND status = 'pending'",
            params![id],
        )?;
        if claimed == 0 {
            tx.commit()?;
            return Ok(None);
        }

        let event = fetch_event(&tx, EventId(id))?;
        tx.commit()?;
        Ok(Some(event))
    }

    /// `processing → done`. Returns `false` if the row was not processing.
    pub fn mark_done(&self, id: EventId, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE outbox_events
             SET status = 'done', last_error = '', processed_at = ?2
             WHERE id = ?1 AND status = 'processing'",
            params![id.0, to_millis(at)],
        )?;
        Ok(changed == 1)
    }

    /// `processing → failed` with the error text truncated.
    pub fn mark_failed(
        &self,
        id: EventId,
        error: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE outbox_events
             SET status = 'failed', last_error = ?2, processed_at = ?3
             WHERE id = ?1 AND status = 'processing'",
            params![id.0, truncate_error(error), to_millis(at)],
        )?;
        Ok(changed == 1)
    }

    pub fn get_event(&self, id: EventId) -> Result<Event, StoreError> {
        let conn = self.lock()?;
        fetch_event(&conn, id)
    }

    /// Newest first, optionally restricted to one status.
    pub fn list_events(
        &self,
        status: Option<EventStatus>,
        limit: usize,
    ) -> Result<Vec<Event>, StoreError> {
        let conn = self.lock()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let raws = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM outbox_events
                     WHERE status = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![status.as_str(), limit], raw_event)?;
                let raws = rows.collect::<Result<Vec<_>, _>>()?;
                raws
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EVENT_COLUMNS} FROM outbox_events
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?1"
                ))?;
                let rows = stmt.query_map(params![limit], raw_event)?;
                let raws = rows.collect::<Result<Vec<_>, _>>()?;
                raws
            }
        };
        raws.into_iter().map(RawEvent::into_event).collect()
    }

    pub fn count_by_status(&self) -> Result<StatusCounts, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM outbox_events GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, count) = row?;
            let count = u64::try_from(count).unwrap_or(0);
            match status.parse::<EventStatus>() {
                Ok(EventStatus::Pending) => counts.pending = count,
                Ok(EventStatus::Processing) => counts.processing = count,
                Ok(EventStatus::Done) => counts.done = count,
                Ok(EventStatus::Failed) => counts.failed = count,
                Err(_) => return Err(StoreError::UnknownStatus(status)),
            }
        }
        Ok(counts)
    }

    /// Re-deliver a failed or stuck event by appending a fresh pending copy.
    ///
    /// The original row keeps its status and error text for the audit trail.
    pub fn requeue_event(&self, id: EventId, at: DateTime<Utc>) -> Result<Event, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let original = fetch_event(&tx, id)?;
        if !matches!(original.status, EventStatus::Failed | EventStatus::Processing) {
            return Err(StoreError::NotRequeueable {
                id,
                status: original.status,
            });
        }
        let payload = serde_json::to_string(&original.payload)?;
        let new_id = insert_raw(&tx, &original.event_type, &payload, at)?;
        let event = fetch_event(&tx, new_id)?;
        tx.commit()?;
        Ok(event)
    }

    /// One retention pass, in a single transaction.
    ///
    /// Deletes `done` rows created before `done_cutoff`, `failed` rows created
    /// before `failed_cutoff`, then, if more than `max_events` rows remain,
    /// the oldest `done` rows beyond the cap. `max_events == 0` disables the
    /// cap. Pending and processing rows are never touched.
    pub fn sweep_outbox(
        &self,
        done_cutoff: DateTime<Utc>,
        failed_cutoff: DateTime<Utc>,
        max_events: u64,
    ) -> Result<CleanupReport, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let deleted_done = tx.execute(
            "DELETE FROM outbox_events WHERE status = 'done' AND created_at < ?1",
            params![to_millis(done_cutoff)],
        )?;
        let deleted_failed = tx.execute(
            "DELETE FROM outbox_events WHERE status = 'failed' AND created_at < ?1",
            params![to_millis(failed_cutoff)],
        )?;

        let mut deleted_overflow = 0;
        if max_events > 0 {
            let total: i64 = tx.query_row("SELECT COUNT(*) FROM outbox_events", [], |row| row.get(0))?;
            let total = u64::try_from(total).unwrap_or(0);
            if total > max_events {
                let overflow = i64::try_from(total - max_events).unwrap_or(i64::MAX);
                deleted_overflow = tx.execute(
                    "DELETE FROM outbox_events WHERE id IN (
                         SELECT id FROM outbox_events
                         WHERE status = 'done'
                         ORDER BY created_at ASC, id ASC
                         LIMIT ?1
                     )",
                    params![overflow],
                )?;
            }
        }

        tx.commit()?;
        Ok(CleanupReport {
            deleted_done,
            deleted_failed,
            deleted_overflow,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FullSyncRequest, PlayerCoinsUpdate, PlayerName, SpendableAction};
    use chrono::Duration;

    fn sync_kind(reason: &str) -> EventKind {
        EventKind::SyncAll(FullSyncRequest {
            reason: reason.to_string(),
            queued_at: None,
        })
    }

    fn coins_kind(player: &str) -> EventKind {
        EventKind::UpdatePlayerCoins(PlayerCoinsUpdate {
            player: PlayerName::from(player),
            coins_total: 1,
            coins_spendable: 1,
            reason: "test".into(),
            spendable_action: SpendableAction::Set,
            spendable_delta: None,
            queued_at: None,
        })
    }

    #[test]
    fn insert_starts_pending_with_zero_attempts() {
        let store = Store::in_memory().unwrap();
        let event = store.insert_event(&coins_kind("alice"), Utc::now()).unwrap();
        assert_eq!(event.status, EventStatus::Pending);
        assert_eq!(event.attempts, 0);
        assert!(event.processed_at.is_none());
        assert_eq!(event.payload["player"], "alice");
        assert_eq!(event.payload["spendable_delta"], Value::Null);
    }

    #[test]
    fn claim_takes_oldest_first_and_increments_attempts() {
        let store = Store::in_memory().unwrap();
        let now = Utc::now();
        let newer = store.insert_event(&sync_kind("newer"), now).unwrap();
        let older = store
            .insert_event(&sync_kind("older"), now - Duration::seconds(10))
            .unwrap();

        let first = store.claim_next().unwrap().expect("claim");
        assert_eq!(first.id, older.id);
        assert_eq!(first.status, EventStatus::Processing);
        assert_eq!(first.attempts, 1);

        let second = store.claim_next().unwrap().expect("claim");
        assert_eq!(second.id, newer.id);
        assert!(store.claim_next().unwrap().is_none());
    }

    #[test]
    fn terminal_status_never_reverts() {
        let store = Store::in_memory().unwrap();
        let event = store.insert_event(&sync_kind("x"), Utc::now()).unwrap();
        assert!(!store.mark_done(event.id, Utc::now()).unwrap(), "pending cannot jump to done");

        store.claim_next().unwrap().expect("claim");
        assert!(store.mark_failed(event.id, "boom", Utc::now()).unwrap());
        assert!(!store.mark_done(event.id, Utc::now()).unwrap());

        let stored = store.get_event(event.id).unwrap();
        assert_eq!(stored.status, EventStatus::Failed);
        assert_eq!(stored.last_error, "boom");
        assert!(stored.processed_at.is_some());
    }

    #[test]
    fn requeue_appends_copy_and_keeps_original() {
        let store = Store::in_memory().unwrap();
        let event = store.insert_event(&coins_kind("bob"), Utc::now()).unwrap();

        let err = store.requeue_event(event.id, Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::NotRequeueable { .. }), "got: {err}");

        store.claim_next().unwrap().expect("claim");
        store.mark_failed(event.id, "offline", Utc::now()).unwrap();

        let copy = store.requeue_event(event.id, Utc::now()).unwrap();
        assert_ne!(copy.id, event.id);
        assert_eq!(copy.status, EventStatus::Pending);
        assert_eq!(copy.payload, event.payload);
        assert_eq!(store.get_event(event.id).unwrap().status, EventStatus::Failed);
    }

    #[test]
    fn list_and_count_by_status() {
        let store = Store::in_memory().unwrap();
        for i in 0..3 {
            store.insert_event(&sync_kind(&format!("r{i}")), Utc::now()).unwrap();
        }
        store.claim_next().unwrap().expect("claim");

        let counts = store.count_by_status().unwrap();
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.processing, 1);
        assert_eq!(counts.total(), 3);

        let pending = store.list_events(Some(EventStatus::Pending), 10).unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].id > pending[1].id, "newest first");
        assert_eq!(store.list_events(None, 1).unwrap().len(), 1);
    }

    #[test]
    fn missing_event_is_reported() {
        let store = Store::in_memory().unwrap();
        let err = store.get_event(EventId(99)).unwrap_err();
        assert!(matches!(err, StoreError::EventNotFound(EventId(99))));
    }
}
