//! Domain types for the coin bridge.
//!
//! Events are stored as a `(event_type, payload)` pair of text columns and
//! only turned into an [`EventKind`] at execution time, so a malformed row
//! surfaces as a [`ValidationError`] on that one event instead of poisoning
//! every query that touches the table.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// Upper bound on the stored `last_error` text, in characters.
pub const MAX_ERROR_CHARS: usize = 5000;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Primary key of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub i64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for EventId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Name of a player as known to the remote game server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerName(pub String);

impl fmt::Display for PlayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for PlayerName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PlayerName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Discriminant stored in the `event_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    UpdatePlayerCoins,
    SyncAll,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::UpdatePlayerCoins => "update_player_coins",
            EventType::SyncAll => "sync_all",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "update_player_coins" => Ok(EventType::UpdatePlayerCoins),
            "sync_all" => Ok(EventType::SyncAll),
            other => Err(ValidationError::UnknownEventType(other.to_string())),
        }
    }
}

/// Lifecycle of an outbox row: `pending → processing → done | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Pending,
    Processing,
    Done,
    Failed,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Processing => "processing",
            EventStatus::Done => "done",
            EventStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(EventStatus::Pending),
            "processing" => Ok(EventStatus::Processing),
            "done" => Ok(EventStatus::Done),
            "failed" => Ok(EventStatus::Failed),
            other => Err(format!(
                "unknown status '{other}'; expected: pending, processing, done, failed"
            )),
        }
    }
}

/// How the worker applies the spendable counter.
///
/// `Set` overwrites the remote value. `Add` applies `spendable_delta` on top of
/// whatever the remote holds, which is what concurrent local spending needs;
/// replaying an `Add` event applies the delta twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpendableAction {
    #[default]
    Set,
    Add,
}

impl fmt::Display for SpendableAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpendableAction::Set => f.write_str("set"),
            SpendableAction::Add => f.write_str("add"),
        }
    }
}

/// Which component wrote a snapshot row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    /// Values the worker just pushed.
    Push,
    /// Values read back from the game server by the reconciler.
    Rcon,
}

impl SnapshotSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotSource::Push => "push",
            SnapshotSource::Rcon => "rcon",
        }
    }
}

impl FromStr for SnapshotSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(SnapshotSource::Push),
            "rcon" => Ok(SnapshotSource::Rcon),
            other => Err(format!("unknown snapshot source '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// Payload of an `update_player_coins` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCoinsUpdate {
    pub player: PlayerName,
    #[serde(default)]
    pub coins_total: i64,
    #[serde(default)]
    pub coins_spendable: i64,
    #[serde(default = "unknown_reason")]
    pub reason: String,
    #[serde(default)]
    pub spendable_action: SpendableAction,
    #[serde(default)]
    pub spendable_delta: Option<i64>,
    #[serde(default)]
    pub queued_at: Option<DateTime<Utc>>,
}

impl PlayerCoinsUpdate {
    /// The spendable operation the worker will actually perform.
    ///
    /// `Add` without a delta has nothing to add, so it degrades to an absolute
    /// set of `coins_spendable`.
    pub fn spendable_op(&self) -> SpendableOp {
        match (self.spendable_action, self.spendable_delta) {
            (SpendableAction::Add, Some(delta)) => SpendableOp::Add(delta),
            _ => SpendableOp::Set(self.coins_spendable),
        }
    }
}

/// Resolved spendable operation for one `update_player_coins` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendableOp {
    Set(i64),
    Add(i64),
}

/// Payload of a `sync_all` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullSyncRequest {
    #[serde(default = "unknown_reason")]
    pub reason: String,
    #[serde(default)]
    pub queued_at: Option<DateTime<Utc>>,
}

fn unknown_reason() -> String {
    "unknown".to_string()
}

/// A typed outbox intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    UpdatePlayerCoins(PlayerCoinsUpdate),
    SyncAll(FullSyncRequest),
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::UpdatePlayerCoins(_) => EventType::UpdatePlayerCoins,
            EventKind::SyncAll(_) => EventType::SyncAll,
        }
    }

    pub fn to_payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            EventKind::UpdatePlayerCoins(update) => serde_json::to_value(update),
            EventKind::SyncAll(request) => serde_json::to_value(request),
        }
    }

    /// Rebuild a typed event from its stored columns.
    pub fn decode(event_type: &str, payload: &Value) -> Result<Self, ValidationError> {
        let ty: EventType = event_type.parse()?;
        let payload_err = |source| ValidationError::Payload {
            event_type: ty.as_str().to_string(),
            source,
        };
        match ty {
            EventType::UpdatePlayerCoins => {
                let update: PlayerCoinsUpdate =
                    serde_json::from_value(payload.clone()).map_err(payload_err)?;
                if update.player.0.trim().is_empty() {
                    return Err(ValidationError::MissingPlayer);
                }
                Ok(EventKind::UpdatePlayerCoins(update))
            }
            EventType::SyncAll => {
                let request: FullSyncRequest =
                    serde_json::from_value(payload.clone()).map_err(payload_err)?;
                Ok(EventKind::SyncAll(request))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// One outbox row as stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: String,
    pub payload: Value,
    pub status: EventStatus,
    pub attempts: u32,
    pub last_error: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn kind(&self) -> Result<EventKind, ValidationError> {
        EventKind::decode(&self.event_type, &self.payload)
    }
}

/// Cached copy of the remote counters for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub player_name: String,
    /// Never negative.
    pub coins_total: i64,
    /// Never negative.
    pub coins_spendable: i64,
    pub source: SnapshotSource,
    pub captured_at: DateTime<Utc>,
}

/// The local primary record for one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    pub name: String,
    /// Identity on the game server; `None` until the player links an account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_name: Option<String>,
    pub coins_total: i64,
    pub coins_spendable: i64,
    pub updated_at: DateTime<Utc>,
}

/// Singleton liveness row for the worker daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct WorkerState {
    pub is_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_error: String,
    /// Bumped on every successful write; the compare-and-swap token.
    pub version: i64,
}

/// Cut `message` down to [`MAX_ERROR_CHARS`] characters on a char boundary.
pub fn truncate_error(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_CHARS) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
