pub mod cleanup;
pub mod coins;
pub mod events;
pub mod inbound;
pub mod player;
pub mod rcon;
pub mod snapshot;
pub mod sync;
pub mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use coinbridge_core::config::database_path;
use coinbridge_core::{BridgeConfig, Outbox, Store, WorkerNotifier};
use coinbridge_rcon::RconClient;

/// Everything a one-shot command needs: home, config and an open database.
pub struct Bridge {
    pub home: PathBuf,
    pub config: BridgeConfig,
    pub store: Arc<Store>,
}

impl Bridge {
    pub fn open() -> Result<Self> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let config = BridgeConfig::load_at(&home).context("failed to load config.yaml")?;
        let path = database_path(&home);
        let store = Store::open(&path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        Ok(Self {
            home,
            config,
            store: Arc::new(store),
        })
    }

    /// Producer handle that wakes a running worker after each insert.
    pub fn outbox(&self) -> Outbox {
        Outbox::new(
            self.store.clone(),
            WorkerNotifier::new(self.config.notify_socket(&self.home)),
        )
    }

    pub fn rcon_client(&self) -> RconClient {
        let rcon = &self.config.rcon;
        RconClient::new(
            rcon.host.clone(),
            rcon.port,
            rcon.password.clone(),
            rcon.timeout(),
        )
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render JSON")?
    );
    Ok(())
}
