//! The `scoreboard_snapshots` table: one row per player, last known remote values.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{from_millis, to_millis, Store};
use crate::error::StoreError;
use crate::types::{Snapshot, SnapshotSource};

fn snapshot_row(row: &Row<'_>) -> rusqlite::Result<(String, i64, i64, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_snapshot(
    (player_name, coins_total, coins_spendable, source, captured_at): (String, i64, i64, String, i64),
) -> Snapshot {
    Snapshot {
        player_name,
        coins_total,
        coins_spendable,
        source: source.parse().unwrap_or(SnapshotSource::Rcon),
        captured_at: from_millis(captured_at),
    }
}

impl Store {
    /// Insert or replace the snapshot for `player_name`.
    ///
    /// Negative inputs are clamped to zero and logged; the remote side is
    /// untrusted and the table never holds a negative balance.
    pub fn upsert_snapshot(
        &self,
        player_name: &str,
        coins_total: i64,
        coins_spendable: i64,
        source: SnapshotSource,
        at: DateTime<Utc>,
    ) -> Result<Snapshot, StoreError> {
        let safe_total = coins_total.max(0);
        let safe_spendable = coins_spendable.max(0);
        if coins_total < 0 || coins_spendable < 0 {
            tracing::warn!(
                player = player_name,
                total = coins_total,
                spendable = coins_spendable,
                "negative snapshot values clamped to zero",
            );
        }

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO scoreboard_snapshots
                 (player_name, coins_total, coins_spendable, source, captured_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (player_name) DO UPDATE SET
                 coins_total = excluded.coins_total,
                 coins_spendable = excluded.coins_spendable,
                 source = excluded.source,
                 captured_at = excluded.captured_at",
            params![
                player_name,
                safe_total,
                safe_spendable,
                source.as_str(),
                to_millis(at)
            ],
        )?;

        Ok(Snapshot {
            player_name: player_name.to_string(),
            coins_total: safe_total,
            coins_spendable: safe_spendable,
            source,
            captured_at: at,
        })
    }

    pub fn get_snapshot(&self, player_name: &str) -> Result<Option<Snapshot>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT player_name, coins_total, coins_spendable, source, captured_at
                 FROM scoreboard_snapshots WHERE player_name = ?1",
                params![player_name],
                snapshot_row,
            )
            .optional()?;
        Ok(raw.map(into_snapshot))
    }

    pub fn list_snapshots(&self) -> Result<Vec<Snapshot>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT player_name, coins_total, coins_spendable, source, captured_at
             FROM scoreboard_snapshots ORDER BY player_name",
        )?;
        let rows = stmt.query_map([], snapshot_row)?;
        let raws = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(raws.into_iter().map(into_snapshot).collect())
    }
}
