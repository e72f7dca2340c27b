//! Outbox retention sweep.
//!
//! Failed events are the forensic trail, so they normally live longer than
//! done events; the row cap only ever eats into `done`.

use chrono::{DateTime, Duration, Utc};

use crate::config::RetentionSettings;
use crate::error::StoreError;
use crate::store::{CleanupReport, Store};

/// Run one sweep against the current time.
pub fn sweep(store: &Store, policy: &RetentionSettings) -> Result<CleanupReport, StoreError> {
    sweep_at(store, policy, Utc::now())
}

/// Run one sweep as if the current time were `now`.
pub fn sweep_at(
    store: &Store,
    policy: &RetentionSettings,
    now: DateTime<Utc>,
) -> Result<CleanupReport, StoreError> {
    let done_cutoff = cutoff(now, policy.done_ttl_days);
    let failed_cutoff = cutoff(now, policy.failed_ttl_days);
    let report = store.sweep_outbox(done_cutoff, failed_cutoff, policy.max_events)?;
    tracing::info!(
        deleted_done = report.deleted_done,
        deleted_failed = report.deleted_failed,
        deleted_overflow = report.deleted_overflow,
        "outbox cleanup finished",
    );
    Ok(report)
}

/// `now` minus `ttl_days`, saturating at the earliest representable time so
/// an oversized TTL keeps everything.
fn cutoff(now: DateTime<Utc>, ttl_days: i64) -> DateTime<Utc> {
    Duration::try_days(ttl_days.max(0))
        .and_then(|ttl| now.checked_sub_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
