//! The outbox worker: claim one event, execute it against the game server,
//! commit the outcome.
//!
//! Everything here is blocking; the runtime drives it from
//! `spawn_blocking`. A failed event is recorded and the loop moves on, so the
//! only errors that escape [`Worker::process_next`] are storage failures
//! around the claim or commit itself.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use coinbridge_core::config::{HealthProbe, ScoreboardSettings};
use coinbridge_core::{
    EventId, EventKind, FullSyncRequest, PlayerCoinsUpdate, SnapshotSource, SpendableOp,
    StoreError, Store, WorkerState,
};
use coinbridge_rcon::{ConnectionCheck, Console, ProbeMode, RconError};

use crate::error::ExecuteError;

/// What happened to one claimed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    Done { id: EventId },
    Failed { id: EventId, error: String },
    /// The row left `processing` before the commit; nothing was written.
    Stale { id: EventId },
}

impl EventOutcome {
    pub fn id(&self) -> EventId {
        match self {
            EventOutcome::Done { id }
            | EventOutcome::Failed { id, .. }
            | EventOutcome::Stale { id } => *id,
        }
    }
}

pub struct Worker {
    store: Arc<Store>,
    console: Arc<dyn Console>,
    scoreboard: ScoreboardSettings,
}

impl Worker {
    pub fn new(store: Arc<Store>, console: Arc<dyn Console>, scoreboard: ScoreboardSettings) -> Self {
        Self {
            store,
            console,
            scoreboard,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Claim, execute and commit the oldest pending event.
    ///
    /// `Ok(None)` means there was nothing to do.
    pub fn process_next(&self) -> Result<Option<EventOutcome>, StoreError> {
        let Some(event) = self.store.claim_next()? else {
            return Ok(None);
        };
        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            attempts = event.attempts,
            "processing event",
        );

        let result = event
            .kind()
            .map_err(ExecuteError::from)
            .and_then(|kind| self.execute(&kind));

        let outcome = match result {
            Ok(()) => {
                if !self.store.mark_done(event.id, Utc::now())? {
                    return Ok(Some(stale(event.id)));
                }
                tracing::info!(event_id = %event.id, event_type = %event.event_type, "event done");
                EventOutcome::Done { id: event.id }
            }
            Err(err) => {
                let error = err.to_string();
                if !self.store.mark_failed(event.id, &error, Utc::now())? {
                    return Ok(Some(stale(event.id)));
                }
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %error,
                    "event failed",
                );
                EventOutcome::Failed { id: event.id, error }
            }
        };
        Ok(Some(outcome))
    }

    pub fn execute(&self, kind: &EventKind) -> Result<(), ExecuteError> {
        match kind {
            EventKind::UpdatePlayerCoins(update) => self.push_player(update),
            EventKind::SyncAll(request) => self.sync_all(request),
        }
    }

    /// Create both objectives; a no-op on the server when they exist.
    pub fn ensure_objectives(&self) -> Result<(), RconError> {
        let board = &self.scoreboard;
        self.console
            .ensure_objective(&board.total_objective, &board.total_display)?;
        self.console
            .ensure_objective(&board.spendable_objective, &board.spendable_display)
    }

    fn push_player(&self, update: &PlayerCoinsUpdate) -> Result<(), ExecuteError> {
        let player = update.player.0.as_str();
        let board = &self.scoreboard;
        self.ensure_objectives()?;

        self.console
            .set_score(player, &board.total_objective, update.coins_total)?;
        match update.spendable_op() {
            SpendableOp::Set(value) => {
                self.console
                    .set_score(player, &board.spendable_objective, value)?
            }
            SpendableOp::Add(delta) => {
                self.console
                    .add_score(player, &board.spendable_objective, delta)?
            }
        }

        self.store.upsert_snapshot(
            player,
            update.coins_total,
            update.coins_spendable,
            SnapshotSource::Push,
            Utc::now(),
        )?;
        tracing::debug!(player, reason = %update.reason, "player coins pushed");
        Ok(())
    }

    fn sync_all(&self, request: &FullSyncRequest) -> Result<(), ExecuteError> {
        let board = &self.scoreboard;
        self.ensure_objectives()?;

        let players = self.store.list_mapped_players()?;
        for player in &players {
            let Some(remote) = player.remote_name.as_deref() else {
                continue;
            };
            self.console
                .set_score(remote, &board.total_objective, player.coins_total)?;
            self.console
                .set_score(remote, &board.spendable_objective, player.coins_spendable)?;
            self.store.upsert_snapshot(
                remote,
                player.coins_total,
                player.coins_spendable,
                SnapshotSource::Push,
                Utc::now(),
            )?;
        }
        tracing::info!(players = players.len(), reason = %request.reason, "full sync pushed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Worker state
    // -----------------------------------------------------------------------

    pub fn mark_started(&self, pid: u32) -> Result<WorkerState, StoreError> {
        let now = Utc::now();
        self.store.update_worker_state(|state| {
            state.is_running = true;
            state.pid = Some(pid);
            state.started_at = Some(now);
            state.last_heartbeat = Some(now);
        })
    }

    pub fn heartbeat(&self) -> Result<WorkerState, StoreError> {
        let now = Utc::now();
        self.store
            .update_worker_state(|state| state.last_heartbeat = Some(now))
    }

    pub fn mark_stopped(&self) -> Result<WorkerState, StoreError> {
        self.store.update_worker_state(|state| {
            state.is_running = false;
            state.pid = None;
        })
    }

    /// Run a connection check and record its result on the worker state.
    pub fn probe_health(&self, probe: HealthProbe) -> Result<ConnectionCheck, StoreError> {
        let check = self.console.check_connection(probe_mode(probe));
        let message = health_message(&check);
        let now = Utc::now();
        self.store.update_worker_state(|state| {
            state.last_error = message.clone();
            state.last_heartbeat = Some(now);
        })?;
        Ok(check)
    }
}

fn stale(id: EventId) -> EventOutcome {
    tracing::warn!(event_id = %id, "event no longer processing at commit, outcome dropped");
    EventOutcome::Stale { id }
}

pub fn probe_mode(probe: HealthProbe) -> ProbeMode {
    match probe {
        HealthProbe::Auth => ProbeMode::Auth,
        HealthProbe::Port => ProbeMode::Port,
    }
}

/// Text stored in `WorkerState.last_error` for a probe result.
pub fn health_message(check: &ConnectionCheck) -> String {
    match (check.ok, check.mode) {
        (true, ProbeMode::Port) => "RCON port reachable (authentication not checked)".to_string(),
        (true, ProbeMode::Auth) => String::new(),
        (false, _) => format!("RCON error: {}", check.error),
    }
}
