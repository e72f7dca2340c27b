//! Coinbridge core library: the durable outbox and everything that touches it
//! without talking to the game server.
//!
//! - [`types`]: event payloads, rows and newtypes
//! - [`error`]: [`ConfigError`], [`StoreError`], [`ValidationError`]
//! - [`config`]: `~/.coinbridge/config.yaml` loading
//! - [`store`]: the SQLite database (outbox, players, snapshots, worker state)
//! - [`outbox`]: the producer API
//! - [`notify`]: the send side of the worker wake-up socket
//! - [`cleanup`]: retention sweep
//! - [`inbound`]: signed spend reports from the game server

pub mod cleanup;
pub mod config;
pub mod error;
pub mod inbound;
pub mod notify;
pub mod outbox;
pub mod store;
pub mod types;

pub use config::BridgeConfig;
pub use error::{ConfigError, StoreError, ValidationError};
pub use notify::WorkerNotifier;
pub use outbox::Outbox;
pub use store::Store;
pub use types::{
    Event, EventId, EventKind, EventStatus, EventType, FullSyncRequest, Player, PlayerCoinsUpdate,
    PlayerName, Snapshot, SnapshotSource, SpendableAction, SpendableOp, WorkerState,
};
