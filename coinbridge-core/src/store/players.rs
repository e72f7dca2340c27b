//! The `players` table: the local primary record of each participant's coins.
//!
//! Names and remote names compare case-insensitively, matching how the game
//! server treats player names.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use super::{from_millis, to_millis, Store};
use crate::error::StoreError;
use crate::types::Player;

const PLAYER_COLUMNS: &str = "name, remote_name, coins_total, coins_spendable, updated_at";

/// Result of an atomic spendable deduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendOutcome {
    pub player: Player,
    pub spendable_before: i64,
}

impl SpendOutcome {
    /// Signed change actually applied (never below the floor of zero).
    pub fn applied_delta(&self) -> i64 {
        self.player.coins_spendable - self.spendable_before
    }
}

fn player_row(row: &Row<'_>) -> rusqlite::Result<Player> {
    Ok(Player {
        name: row.get(0)?,
        remote_name: row.get(1)?,
        coins_total: row.get(2)?,
        coins_spendable: row.get(3)?,
        updated_at: from_millis(row.get(4)?),
    })
}

fn fetch_player(conn: &Connection, name: &str) -> Result<Option<Player>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {PLAYER_COLUMNS} FROM players WHERE name = ?1"),
            params![name],
            player_row,
        )
        .optional()?)
}

fn fetch_by_remote(conn: &Connection, remote: &str) -> Result<Option<Player>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {PLAYER_COLUMNS} FROM players WHERE remote_name = ?1"),
            params![remote],
            player_row,
        )
        .optional()?)
}

fn normalize_remote(remote: Option<&str>) -> Option<&str> {
    remote.map(str::trim).filter(|r| !r.is_empty())
}

impl Store {
    /// Insert or replace a player's record. Coin values are clamped at zero.
    pub fn upsert_player(
        &self,
        name: &str,
        remote_name: Option<&str>,
        coins_total: i64,
        coins_spendable: i64,
    ) -> Result<Player, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO players (name, remote_name, coins_total, coins_spendable, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (name) DO UPDATE SET
                 remote_name = excluded.remote_name,
                 coins_total = excluded.coins_total,
                 coins_spendable = excluded.coins_spendable,
                 updated_at = excluded.updated_at",
            params![
                name,
                normalize_remote(remote_name),
                coins_total.max(0),
                coins_spendable.max(0),
                to_millis(Utc::now())
            ],
        )?;
        fetch_player(&conn, name)?.ok_or_else(|| StoreError::PlayerNotFound(name.to_string()))
    }

    pub fn get_player(&self, name: &str) -> Result<Option<Player>, StoreError> {
        let conn = self.lock()?;
        fetch_player(&conn, name)
    }

    /// Link (or with `None`, unlink) a player's game-server identity.
    pub fn map_remote_name(&self, name: &str, remote: Option<&str>) -> Result<Player, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE players SET remote_name = ?2, updated_at = ?3 WHERE name = ?1",
            params![name, normalize_remote(remote), to_millis(Utc::now())],
        )?;
        if changed == 0 {
            return Err(StoreError::PlayerNotFound(name.to_string()));
        }
        fetch_player(&conn, name)?.ok_or_else(|| StoreError::PlayerNotFound(name.to_string()))
    }

    pub fn list_players(&self) -> Result<Vec<Player>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {PLAYER_COLUMNS} FROM players ORDER BY name"))?;
        let rows = stmt.query_map([], player_row)?;
        let players = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(players)
    }

    /// Players with a game-server identity, ordered by remote name.
    pub fn list_mapped_players(&self) -> Result<Vec<Player>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players
             WHERE remote_name IS NOT NULL AND remote_name != ''
             ORDER BY remote_name"
        ))?;
        let rows = stmt.query_map([], player_row)?;
        let players = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(players)
    }

    /// Overwrite the spendable balance of the player mapped to `remote`.
    ///
    /// Returns the previous value, or `None` when no player is mapped.
    pub fn set_spendable_by_remote(
        &self,
        remote: &str,
        coins_spendable: i64,
    ) -> Result<Option<i64>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(player) = fetch_by_remote(&tx, remote)? else {
            return Ok(None);
        };
        tx.execute(
            "UPDATE players SET coins_spendable = ?2, updated_at = ?3 WHERE name = ?1",
            params![player.name, coins_spendable.max(0), to_millis(Utc::now())],
        )?;
        tx.commit()?;
        Ok(Some(player.coins_spendable))
    }

    /// Deduct `amount` from the spendable balance of the player mapped to
    /// `remote`, flooring at zero, in one transaction.
    pub fn deduct_spendable_by_remote(
        &self,
        remote: &str,
        amount: i64,
    ) -> Result<Option<SpendOutcome>, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(player) = fetch_by_remote(&tx, remote)? else {
            return Ok(None);
        };
        let before = player.coins_spendable;
        let after = (before - amount).max(0);
        tx.execute(
            "UPDATE players SET coins_spendable = ?2, updated_at = ?3 WHERE name = ?1",
            params![player.name, after, to_millis(Utc::now())],
        )?;
        let updated = fetch_player(&tx, &player.name)?
            .ok_or_else(|| StoreError::PlayerNotFound(player.name.clone()))?;
        tx.commit()?;
        Ok(Some(SpendOutcome {
            player: updated,
            spendable_before: before,
        }))
    }
}
