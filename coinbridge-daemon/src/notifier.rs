//! Receive side of the worker wake-up socket.
//!
//! The socket file exists only while the worker is inside
//! [`wait_for_notification`]. A producer that fires between two waits finds
//! no listener and its wake-up is lost; the worker still finds the event on
//! its next pending check.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UnixDatagram;

/// How one wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A wake-up datagram arrived.
    Notified,
    TimedOut,
    /// The socket could not be bound or read; fall back to polling.
    Unavailable,
}

impl WaitOutcome {
    pub fn notified(self) -> bool {
        self == WaitOutcome::Notified
    }
}

/// Removes the socket file when the wait ends, however it ends.
struct Endpoint {
    path: PathBuf,
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                tracing::debug!(socket = %self.path.display(), error = %err, "wake socket cleanup failed");
            }
        }
    }
}

/// Bind `path`, wait up to `timeout` for one datagram, unbind.
pub async fn wait_for_notification(path: &Path, timeout: Duration) -> WaitOutcome {
    let (socket, _endpoint) = match bind(path) {
        Ok(bound) => bound,
        Err(err) => {
            tracing::warn!(socket = %path.display(), error = %err, "wake socket unavailable, polling");
            return WaitOutcome::Unavailable;
        }
    };

    let mut buf = [0u8; 16];
    match tokio::time::timeout(timeout, socket.recv(&mut buf)).await {
        Ok(Ok(_)) => {
            tracing::debug!("wake-up received");
            WaitOutcome::Notified
        }
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "wake socket receive failed");
            WaitOutcome::Unavailable
        }
        Err(_) => WaitOutcome::TimedOut,
    }
}

fn bind(path: &Path) -> io::Result<(UnixDatagram, Endpoint)> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    let socket = UnixDatagram::bind(path)?;
    let endpoint = Endpoint {
        path: path.to_path_buf(),
    };
    set_socket_permissions(path)?;
    Ok((socket, endpoint))
}

/// Producers may run as a different user than the worker.
fn set_socket_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o666))
}
