//! Send side of the worker wake-up channel.
//!
//! Producers fire one byte at the worker's datagram socket after every
//! enqueue. The worker only binds that socket while it is idle-waiting, so a
//! missing socket is the normal case and is not an error worth surfacing:
//! the pending-event query is the source of truth, and a lost wake-up costs at
//! most one poll interval.

use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// The single byte carried by every wake-up datagram.
pub const WAKE_BYTE: u8 = 0x01;

/// Transport failure while sending a wake-up. Logged, never returned to producers.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("worker is not listening on {0}")]
    NotListening(PathBuf),

    #[error("wake-up send to {path} failed: {source}")]
    Send {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Fire-and-forget wake-up sender.
#[derive(Debug, Clone)]
pub struct WorkerNotifier {
    socket_path: PathBuf,
}

impl WorkerNotifier {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Wake the worker if it happens to be waiting. Never blocks, never fails.
    ///
    /// Returns whether the datagram was handed to the kernel.
    pub fn notify(&self) -> bool {
        match self.try_notify() {
            Ok(()) => {
                tracing::debug!(socket = %self.socket_path.display(), "worker notified");
                true
            }
            Err(err) => {
                tracing::debug!(error = %err, "worker notification dropped");
                false
            }
        }
    }

    fn try_notify(&self) -> Result<(), NotifyError> {
        let send_err = |source| NotifyError::Send {
            path: self.socket_path.clone(),
            source,
        };
        let socket = UnixDatagram::unbound().map_err(send_err)?;
        socket.set_nonblocking(true).map_err(send_err)?;
        match socket.send_to(&[WAKE_BYTE], &self.socket_path) {
            Ok(_) => Ok(()),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
                ) =>
            {
                Err(NotifyError::NotListening(self.socket_path.clone()))
            }
            Err(err) => Err(send_err(err)),
        }
    }
}
