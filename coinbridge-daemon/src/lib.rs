//! Bridge worker daemon: outbox worker loop, health probe, snapshot refresh,
//! retention sweep and a control socket.

mod error;
pub mod notifier;
pub mod paths;
pub mod protocol;
pub mod reconciler;
mod runtime;
pub mod worker;

pub use error::{DaemonError, ExecuteError};
pub use notifier::{wait_for_notification, WaitOutcome};
pub use protocol::{
    request_cleanup, request_refresh, request_status, request_stop, request_sync, send_request,
    DaemonRequest, DaemonResponse,
};
pub use reconciler::Reconciler;
pub use runtime::{init_tracing, run, run_worker, start_blocking, IdleWait};
pub use worker::{EventOutcome, Worker};
