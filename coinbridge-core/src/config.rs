//! Bridge configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.coinbridge/
//!   config.yaml            (optional; every field has a default)
//!   bridge.db              (outbox, players, snapshots, worker state)
//!   run/
//!     bridge_worker.sock   (wake-up datagram socket, bound only while the worker waits)
//!     control.sock         (daemon control socket)
//! ```
//!
//! Like every loader in this workspace, [`BridgeConfig::load_at`] takes an
//! explicit home so tests can point it at a `TempDir`; [`BridgeConfig::load`]
//! derives home from `dirs::home_dir()`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{config_io_err, ConfigError};

pub const PASSWORD_ENV: &str = "COINBRIDGE_RCON_PASSWORD";
pub const INBOUND_SECRET_ENV: &str = "COINBRIDGE_INBOUND_SECRET";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.coinbridge`
pub fn bridge_root(home: &Path) -> PathBuf {
    home.join(".coinbridge")
}

/// `<home>/.coinbridge/config.yaml`
pub fn config_path(home: &Path) -> PathBuf {
    bridge_root(home).join("config.yaml")
}

/// `<home>/.coinbridge/bridge.db`
pub fn database_path(home: &Path) -> PathBuf {
    bridge_root(home).join("bridge.db")
}

/// `<home>/.coinbridge/run`
pub fn run_dir(home: &Path) -> PathBuf {
    bridge_root(home).join("run")
}

/// Default well-known path of the worker wake-up socket.
pub fn default_notify_socket(home: &Path) -> PathBuf {
    run_dir(home).join("bridge_worker.sock")
}

/// Resolve the user's home directory.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// 2. Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RconSettings {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub timeout_secs: u64,
}

impl Default for RconSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 25575,
            password: String::new(),
            timeout_secs: 5,
        }
    }
}

impl RconSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Names of the two remote scoreboard objectives carrying the currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreboardSettings {
    pub total_objective: String,
    pub total_display: String,
    pub spendable_objective: String,
    pub spendable_display: String,
}

impl Default for ScoreboardSettings {
    fn default() -> Self {
        Self {
            total_objective: "coins_total".to_string(),
            total_display: "Total Coins".to_string(),
            spendable_objective: "coins_spendable".to_string(),
            spendable_display: "Spendable Coins".to_string(),
        }
    }
}

/// How the health probe talks to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthProbe {
    /// Full login + command round trip.
    #[default]
    Auth,
    /// Bare TCP reachability.
    Port,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Fallback sleep when no notification arrived.
    pub poll_interval_secs: u64,
    /// Upper bound on one notifier wait.
    pub notify_wait_secs: u64,
    pub health_interval_secs: u64,
    pub health_probe: HealthProbe,
    /// Overrides `<home>/.coinbridge/run/bridge_worker.sock`.
    pub notify_socket: Option<PathBuf>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            notify_wait_secs: 10,
            health_interval_secs: 60,
            health_probe: HealthProbe::Auth,
            notify_socket: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Fold the spendable value read back into the local player record.
    pub pull_spendable: bool,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            pull_spendable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSettings {
    pub done_ttl_days: i64,
    pub failed_ttl_days: i64,
    /// Cap on the total row count; `0` disables the overflow sweep.
    pub max_events: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            done_ttl_days: 7,
            failed_ttl_days: 30,
            max_events: 10_000,
            cleanup_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InboundSettings {
    pub enabled: bool,
    pub shared_secret: String,
    pub allowed_server_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// 3. Root
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    pub rcon: RconSettings,
    pub scoreboard: ScoreboardSettings,
    pub worker: WorkerSettings,
    pub snapshot: SnapshotSettings,
    pub retention: RetentionSettings,
    pub inbound: InboundSettings,
}

impl BridgeConfig {
    /// Load `<home>/.coinbridge/config.yaml`, falling back to defaults when
    /// the file is absent, then apply environment overrides.
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        let path = config_path(home);
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| config_io_err(&path, e))?;
            if contents.trim().is_empty() {
                BridgeConfig::default()
            } else {
                serde_yaml::from_str(&contents)
                    .map_err(|source| ConfigError::Parse { path, source })?
            }
        } else {
            BridgeConfig::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// `load_at` convenience wrapper.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&home()?)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(password) = lookup(PASSWORD_ENV).filter(|v| !v.is_empty()) {
            self.rcon.password = password;
        }
        if let Some(secret) = lookup(INBOUND_SECRET_ENV).filter(|v| !v.is_empty()) {
            self.inbound.shared_secret = secret;
        }
    }

    pub fn notify_socket(&self, home: &Path) -> PathBuf {
        self.worker
            .notify_socket
            .clone()
            .unwrap_or_else(|| default_notify_socket(home))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let home = TempDir::new().expect("home");
        let mut config = BridgeConfig::load_at(home.path()).expect("load");
        // Environment may carry a password on CI; compare the rest.
        config.rcon.password.clear();
        config.inbound.shared_secret.clear();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.rcon.port, 25575);
        assert_eq!(config.retention.max_events, 10_000);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let home = TempDir::new().expect("home");
        std::fs::create_dir_all(bridge_root(home.path())).expect("mkdir");
        std::fs::write(
            config_path(home.path()),
            "rcon:\n  host: mc.example\nsnapshot:\n  pull_spendable: true\n",
        )
        .expect("write");

        let config = BridgeConfig::load_at(home.path()).expect("load");
        assert_eq!(config.rcon.host, "mc.example");
        assert_eq!(config.rcon.port, 25575);
        assert!(config.snapshot.pull_spendable);
        assert_eq!(config.snapshot.interval_secs, 300);
    }

    #[test]
    fn corrupt_yaml_reports_path() {
        let home = TempDir::new().expect("home");
        std::fs::create_dir_all(bridge_root(home.path())).expect("mkdir");
        std::fs::write(config_path(home.path()), "rcon: [unclosed").expect("write");

        let err = BridgeConfig::load_at(home.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn env_overrides_secrets() {
        let mut config = BridgeConfig::default();
        config.apply_env(|key| match key {
            PASSWORD_ENV => Some("hunter2".to_string()),
            INBOUND_SECRET_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.rcon.password, "hunter2");
        assert!(config.inbound.shared_secret.is_empty());
    }

    #[test]
    fn notify_socket_defaults_under_run_dir() {
        let home = Path::new("/home/rider");
        let config = BridgeConfig::default();
        assert_eq!(
            config.notify_socket(home),
            PathBuf::from("/home/rider/.coinbridge/run/bridge_worker.sock")
        );
    }
}
