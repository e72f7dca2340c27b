use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, Notify};

use coinbridge_core::{cleanup, BridgeConfig, Outbox, Store};
use coinbridge_rcon::{Console, RconClient};

use crate::error::{io_err, join_err, DaemonError};
use crate::notifier::wait_for_notification;
use crate::paths::{control_socket_path, database_path, run_dir};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::reconciler::Reconciler;
use crate::worker::{health_message, Worker};

/// How the worker waits when the outbox is empty.
#[derive(Debug, Clone)]
pub struct IdleWait {
    /// Datagram socket bound for the duration of each wait.
    pub socket: PathBuf,
    /// Upper bound on one notifier wait.
    pub notify_wait: Duration,
    /// Sleep after a wait that received nothing.
    pub fallback: Duration,
}

impl IdleWait {
    pub fn from_config(config: &BridgeConfig, home: &Path) -> Self {
        Self {
            socket: config.notify_socket(home),
            notify_wait: Duration::from_secs(config.worker.notify_wait_secs),
            fallback: Duration::from_secs(config.worker.poll_interval_secs),
        }
    }
}

/// Shared handles for every daemon task.
struct Services {
    home: PathBuf,
    config: BridgeConfig,
    store: Arc<Store>,
    outbox: Outbox,
    worker: Arc<Worker>,
    reconciler: Arc<Reconciler>,
    wake: Arc<Notify>,
    started_at: DateTime<Utc>,
}

impl Services {
    fn new(home: PathBuf, config: BridgeConfig, store: Arc<Store>, console: Arc<dyn Console>) -> Self {
        Self {
            worker: Arc::new(Worker::new(
                store.clone(),
                console.clone(),
                config.scoreboard.clone(),
            )),
            reconciler: Arc::new(Reconciler::new(
                store.clone(),
                console,
                config.scoreboard.clone(),
                &config.snapshot,
            )),
            outbox: Outbox::without_notifier(store.clone()),
            store,
            wake: Arc::new(Notify::new()),
            started_at: Utc::now(),
            home,
            config,
        }
    }
}

/// Load config, open the database and run the daemon on the current thread
/// until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let config = BridgeConfig::load_at(home)?;
    let console: Arc<dyn Console> = Arc::new(RconClient::new(
        config.rcon.host.clone(),
        config.rcon.port,
        config.rcon.password.clone(),
        config.rcon.timeout(),
    ));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), config, console))
}

/// Run the daemon: worker loop, health probe, snapshot refresh, cleanup and
/// the control socket, until ctrl-c or a `stop` request.
pub async fn run(
    home: PathBuf,
    config: BridgeConfig,
    console: Arc<dyn Console>,
) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let db_path = database_path(&home);
    let store = Arc::new(
        tokio::task::spawn_blocking(move || Store::open(&db_path))
            .await
            .map_err(|err| join_err("store open", err))??,
    );
    let services = Arc::new(Services::new(home, config, store, console));

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let worker_handle = {
        let shutdown = shutdown_tx.clone();
        let worker = services.worker.clone();
        let idle = IdleWait::from_config(&services.config, &services.home);
        let wake = services.wake.clone();
        tokio::spawn(async move {
            let result = run_worker(worker, idle, wake, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let health_handle = {
        let shutdown = shutdown_tx.clone();
        let services = services.clone();
        tokio::spawn(async move {
            let result = health_task(services, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let snapshot_handle = {
        let shutdown = shutdown_tx.clone();
        let services = services.clone();
        tokio::spawn(async move {
            let result = snapshot_task(services, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let cleanup_handle = {
        let shutdown = shutdown_tx.clone();
        let services = services.clone();
        tokio::spawn(async move {
            let result = cleanup_task(services, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let services = services.clone();
        tokio::spawn(async move {
            let result =
                socket_server_task(services, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down worker");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (worker_result, health_result, snapshot_result, cleanup_result, socket_result, signal_result) = tokio::join!(
        worker_handle,
        health_handle,
        snapshot_handle,
        cleanup_handle,
        socket_handle,
        signal_handle
    );

    handle_join("worker", worker_result)?;
    handle_join("health", health_result)?;
    handle_join("snapshot", snapshot_result)?;
    handle_join("cleanup", cleanup_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Worker loop
// ---------------------------------------------------------------------------

/// Drain the outbox one event at a time, idling on the notifier when empty.
///
/// Records start and stop on the worker state row. Shutdown is observed
/// between events, never during one.
pub async fn run_worker(
    worker: Arc<Worker>,
    idle: IdleWait,
    wake: Arc<Notify>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let pid = std::process::id();
    {
        let worker = worker.clone();
        blocking("worker start", move || worker.mark_started(pid)).await??;
    }
    tracing::info!(pid, socket = %idle.socket.display(), "worker started");

    loop {
        if shutdown_requested(&mut shutdown_rx) {
            break;
        }

        let cycle = {
            let worker = worker.clone();
            blocking("worker cycle", move || {
                let processed = worker.process_next();
                if let Err(err) = worker.heartbeat() {
                    tracing::warn!(error = %err, "heartbeat write failed");
                }
                processed
            })
            .await?
        };
        match cycle {
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(err) => {
                tracing::error!(error = %err, "claim or commit failed, idling before retry");
            }
        }

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = wake.notified() => continue,
            outcome = wait_for_notification(&idle.socket, idle.notify_wait) => {
                if outcome.notified() {
                    continue;
                }
                tracing::debug!(?outcome, sleep_ms = idle.fallback.as_millis() as u64, "no wake-up, sleeping");
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = wake.notified() => {}
                    _ = tokio::time::sleep(idle.fallback) => {}
                }
            }
        }
    }

    blocking("worker stop", move || worker.mark_stopped()).await??;
    tracing::info!("worker stopped");
    Ok(())
}

fn shutdown_requested(shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
    !matches!(
        shutdown_rx.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    )
}

// ---------------------------------------------------------------------------
// Periodic tasks
// ---------------------------------------------------------------------------

async fn health_task(
    services: Arc<Services>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let period = Duration::from_secs(services.config.worker.health_interval_secs.max(1));
    let probe = services.config.worker.health_probe;
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last: Option<(bool, String)> = None;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let worker = services.worker.clone();
                match blocking("health probe", move || worker.probe_health(probe)).await? {
                    Ok(check) => {
                        let current = (check.ok, check.error.clone());
                        if last.as_ref() != Some(&current) {
                            if check.ok {
                                tracing::info!(mode = %check.mode, status = %health_message(&check), "RCON reachable");
                            } else {
                                tracing::warn!(mode = %check.mode, error = %check.error, "RCON connection failed");
                            }
                        }
                        last = Some(current);
                    }
                    Err(err) => tracing::warn!(error = %err, "could not record health probe"),
                }
            }
        }
    }
    Ok(())
}

async fn snapshot_task(
    services: Arc<Services>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    if !services.config.snapshot.enabled {
        tracing::info!("snapshot refresh disabled");
        let _ = shutdown_rx.recv().await;
        return Ok(());
    }

    let period = Duration::from_secs(services.config.snapshot.interval_secs.max(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                if let Err(err) = refresh_snapshots(&services).await {
                    tracing::error!(error = %err, "snapshot refresh failed");
                }
            }
        }
    }
    Ok(())
}

async fn cleanup_task(
    services: Arc<Services>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let period = Duration::from_secs(services.config.retention.cleanup_interval_secs.max(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                if let Err(err) = run_cleanup(&services).await {
                    tracing::error!(error = %err, "outbox cleanup failed");
                }
            }
        }
    }
    Ok(())
}

async fn refresh_snapshots(services: &Services) -> Result<usize, DaemonError> {
    let reconciler = services.reconciler.clone();
    Ok(blocking("snapshot refresh", move || reconciler.refresh()).await??)
}

async fn run_cleanup(services: &Services) -> Result<Value, DaemonError> {
    let store = services.store.clone();
    let policy = services.config.retention.clone();
    let report = blocking("cleanup", move || cleanup::sweep(&store, &policy)).await??;
    Ok(json!(report))
}

// ---------------------------------------------------------------------------
// Control socket
// ---------------------------------------------------------------------------

async fn socket_server_task(
    services: Arc<Services>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = control_socket_path(&services.home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let services = services.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, services, shutdown_tx).await {
                        tracing::error!(error = %err, "control socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    services: Arc<Services>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("control socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<DaemonRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd.as_str() {
            "status" => match build_status_payload(&services).await {
                Ok(payload) => DaemonResponse::ok(payload),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            "sync" => {
                let reason = request.reason.clone().unwrap_or_else(|| "control_socket".to_string());
                let outbox = services.outbox.clone();
                match blocking("queue sync", move || outbox.queue_full_sync(&reason)).await {
                    Ok(Ok(event)) => {
                        services.wake.notify_one();
                        DaemonResponse::ok(json!({ "event_id": event.id }))
                    }
                    Ok(Err(err)) => DaemonResponse::error(err.to_string()),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            "refresh" => match refresh_snapshots(&services).await {
                Ok(updated) => DaemonResponse::ok(json!({ "updated": updated })),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            "cleanup" => match run_cleanup(&services).await {
                Ok(report) => DaemonResponse::ok(report),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(services: &Services) -> Result<Value, DaemonError> {
    let store = services.store.clone();
    let (state, counts) = blocking("status", move || {
        Ok::<_, DaemonError>((store.load_worker_state()?, store.count_by_status()?))
    })
    .await??;

    Ok(json!({
        "running": true,
        "pid": std::process::id(),
        "started_at": services.started_at,
        "worker": state,
        "events": counts,
        "rcon": format!("{}:{}", services.config.rcon.host, services.config.rcon.port),
        "control_socket": control_socket_path(&services.home).display().to_string(),
        "notify_socket": services.config.notify_socket(&services.home).display().to_string(),
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn blocking<T, F>(task: &'static str, f: F) -> Result<T, DaemonError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| join_err(task, err))
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "worker control socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale control socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let run = run_dir(home);
    if !run.exists() {
        fs::create_dir_all(&run).map_err(|e| io_err(&run, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("control socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("control socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("control socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(join_err(task, err)),
    }
}

/// Install the global subscriber on stderr: `RUST_LOG` if set, `info`
/// otherwise.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}
