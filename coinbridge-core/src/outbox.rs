//! Producer API: append intents to the outbox and nudge the worker.
//!
//! Producers never talk to the game server. They insert a row and fire a
//! best-effort wake-up; the insert is the only shared operation and SQLite
//! makes it atomic, so concurrent producers need no coordination.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::notify::WorkerNotifier;
use crate::store::Store;
use crate::types::{
    Event, EventId, EventKind, FullSyncRequest, PlayerCoinsUpdate, PlayerName, SpendableAction,
};

/// Handle used by every producer.
#[derive(Clone)]
pub struct Outbox {
    store: Arc<Store>,
    notifier: Option<WorkerNotifier>,
}

impl Outbox {
    pub fn new(store: Arc<Store>, notifier: WorkerNotifier) -> Self {
        Self {
            store,
            notifier: Some(notifier),
        }
    }

    /// An outbox that never sends wake-ups; the worker finds events by polling.
    pub fn without_notifier(store: Arc<Store>) -> Self {
        Self {
            store,
            notifier: None,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Append a pending event, then wake the worker.
    pub fn enqueue(&self, kind: EventKind) -> Result<Event, StoreError> {
        self.enqueue_at(kind, Utc::now())
    }

    /// `enqueue` with an explicit creation time.
    pub fn enqueue_at(&self, kind: EventKind, at: DateTime<Utc>) -> Result<Event, StoreError> {
        let event = self.store.insert_event(&kind, at)?;
        self.wake();
        Ok(event)
    }

    /// Queue a push of one player's counters.
    ///
    /// `coins_total` is always applied absolutely. The spendable counter is
    /// set to `coins_spendable` when `spendable_action` is `Set`, or moved by
    /// `spendable_delta` when it is `Add`.
    pub fn queue_player_coins_update(
        &self,
        player: &str,
        coins_total: i64,
        coins_spendable: i64,
        reason: &str,
        spendable_action: SpendableAction,
        spendable_delta: Option<i64>,
    ) -> Result<Event, StoreError> {
        let event = self.enqueue(EventKind::UpdatePlayerCoins(PlayerCoinsUpdate {
            player: PlayerName::from(player),
            coins_total,
            coins_spendable,
            reason: reason.to_string(),
            spendable_action,
            spendable_delta,
            queued_at: Some(Utc::now()),
        }))?;
        tracing::info!(
            event_id = %event.id,
            player,
            reason,
            spendable_action = %spendable_action,
            "queued player coins update",
        );
        Ok(event)
    }

    /// Queue a bulk push of every mapped player's current totals.
    pub fn queue_full_sync(&self, reason: &str) -> Result<Event, StoreError> {
        let event = self.enqueue(EventKind::SyncAll(FullSyncRequest {
            reason: reason.to_string(),
            queued_at: Some(Utc::now()),
        }))?;
        tracing::info!(event_id = %event.id, reason, "queued full sync");
        Ok(event)
    }

    /// Manual re-delivery of a failed or stuck event.
    pub fn requeue(&self, id: EventId) -> Result<Event, StoreError> {
        let event = self.store.requeue_event(id, Utc::now())?;
        self.wake();
        tracing::info!(original = %id, event_id = %event.id, "requeued event");
        Ok(event)
    }

    fn wake(&self) {
        if let Some(notifier) = &self.notifier {
            notifier.notify();
        }
    }
}
