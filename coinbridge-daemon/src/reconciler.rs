//! Read the remote scoreboard back into the snapshot cache.

use std::sync::Arc;

use chrono::Utc;

use coinbridge_core::config::{ScoreboardSettings, SnapshotSettings};
use coinbridge_core::{SnapshotSource, Store};
use coinbridge_rcon::Console;

use crate::error::ExecuteError;

pub struct Reconciler {
    store: Arc<Store>,
    console: Arc<dyn Console>,
    scoreboard: ScoreboardSettings,
    pull_spendable: bool,
}

impl Reconciler {
    pub fn new(
        store: Arc<Store>,
        console: Arc<dyn Console>,
        scoreboard: ScoreboardSettings,
        settings: &SnapshotSettings,
    ) -> Self {
        Self {
            store,
            console,
            scoreboard,
            pull_spendable: settings.pull_spendable,
        }
    }

    /// Refresh every mapped player's snapshot. Returns how many were written.
    ///
    /// A transport error aborts the pass; snapshots written before it stay.
    pub fn refresh(&self) -> Result<usize, ExecuteError> {
        let board = &self.scoreboard;
        self.console
            .ensure_objective(&board.total_objective, &board.total_display)?;
        self.console
            .ensure_objective(&board.spendable_objective, &board.spendable_display)?;

        let players = self.store.list_mapped_players()?;
        tracing::info!(players = players.len(), "refreshing scoreboard snapshots");

        let mut updated = 0;
        for player in &players {
            let Some(remote) = player.remote_name.as_deref() else {
                continue;
            };
            let total = self.console.get_score(remote, &board.total_objective)?;
            let spendable = self.console.get_score(remote, &board.spendable_objective)?;
            if total.is_none() && spendable.is_none() {
                tracing::info!(player = remote, "no scores on server, skipping");
                continue;
            }

            if self.pull_spendable {
                if let Some(value) = spendable {
                    let previous = self.store.set_spendable_by_remote(remote, value.max(0))?;
                    tracing::info!(
                        player = remote,
                        old = ?previous,
                        new = value.max(0),
                        "local spendable updated from scoreboard",
                    );
                }
            }

            // upsert_snapshot clamps negatives and warns.
            self.store.upsert_snapshot(
                remote,
                total.unwrap_or(0),
                spendable.unwrap_or(0),
                SnapshotSource::Rcon,
                Utc::now(),
            )?;
            updated += 1;
        }

        tracing::info!(updated, "scoreboard snapshots refreshed");
        Ok(updated)
    }
}
