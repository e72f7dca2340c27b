//! Retention sweep tests: age cutoffs per status and the row cap.

use chrono::{DateTime, Duration, Utc};
use coinbridge_core::cleanup;
use coinbridge_core::config::RetentionSettings;
use coinbridge_core::store::CleanupReport;
use coinbridge_core::{EventKind, EventStatus, FullSyncRequest, Store};
use rstest::rstest;

fn kind() -> EventKind {
    EventKind::SyncAll(FullSyncRequest {
        reason: "retention".into(),
        queued_at: None,
    })
}

/// Insert an event created at `at` and drive it to `status`.
///
/// Must be called with no other pending rows in the store, since claiming
/// always takes the oldest pending event.
fn seed(store: &Store, status: EventStatus, at: DateTime<Utc>) {
    let event = store.insert_event(&kind(), at).expect("insert");
    if status == EventStatus::Pending {
        return;
    }
    let claimed = store.claim_next().expect("claim").expect("claimed");
    assert_eq!(claimed.id, event.id);
    match status {
        EventStatus::Done => assert!(store.mark_done(event.id, at).expect("done")),
        EventStatus::Failed => assert!(store.mark_failed(event.id, "boom", at).expect("failed")),
        _ => {}
    }
}

fn policy(done_ttl_days: i64, failed_ttl_days: i64, max_events: u64) -> RetentionSettings {
    RetentionSettings {
        done_ttl_days,
        failed_ttl_days,
        max_events,
        ..RetentionSettings::default()
    }
}

#[test]
fn age_cutoffs_apply_per_status() {
    let store = Store::in_memory().expect("store");
    let now = Utc::now();

    for _ in 0..3 {
        seed(&store, EventStatus::Done, now - Duration::days(10));
    }
    seed(&store, EventStatus::Done, now - Duration::days(2));
    for _ in 0..2 {
        seed(&store, EventStatus::Failed, now - Duration::days(40));
    }
    seed(&store, EventStatus::Failed, now - Duration::days(10));
    seed(&store, EventStatus::Processing, now - Duration::days(90));
    seed(&store, EventStatus::Pending, now - Duration::days(90));

    let report = cleanup::sweep_at(&store, &policy(7, 30, 0), now).expect("sweep");
    assert_eq!(
        report,
        CleanupReport {
            deleted_done: 3,
            deleted_failed: 2,
            deleted_overflow: 0,
        }
    );

    let counts = store.count_by_status().expect("counts");
    assert_eq!(counts.done, 1);
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.processing, 1, "in-flight rows are never swept");
    assert_eq!(counts.pending, 1, "pending rows are never swept");
}

#[rstest]
#[case::under_cap(5, 10, 0)]
#[case::at_cap(5, 5, 0)]
#[case::over_cap(8, 5, 3)]
#[case::cap_disabled(8, 0, 0)]
fn overflow_removes_oldest_done_beyond_cap(
    #[case] done_rows: i64,
    #[case] max_events: u64,
    #[case] expected_overflow: usize,
) {
    let store = Store::in_memory().expect("store");
    let now = Utc::now();
    for i in 0..done_rows {
        seed(&store, EventStatus::Done, now - Duration::minutes(done_rows - i));
    }

    let report = cleanup::sweep_at(&store, &policy(7, 30, max_events), now).expect("sweep");
    assert_eq!(report.deleted_overflow, expected_overflow);
    assert_eq!(report.deleted_done, 0);

    let remaining = store.list_events(Some(EventStatus::Done), 100).expect("list");
    assert_eq!(remaining.len() as i64, done_rows - expected_overflow as i64);
    if expected_overflow > 0 {
        // Newest survive.
        let newest = remaining.iter().map(|e| e.created_at).max().expect("rows");
        assert_eq!(newest.timestamp_millis(), (now - Duration::minutes(1)).timestamp_millis());
    }
}

#[test]
fn overflow_never_deletes_failed_rows() {
    let store = Store::in_memory().expect("store");
    let now = Utc::now();
    for i in 0..4 {
        seed(&store, EventStatus::Failed, now - Duration::minutes(10 + i));
    }
    seed(&store, EventStatus::Done, now - Duration::minutes(1));

    let report = cleanup::sweep_at(&store, &policy(7, 30, 2), now).expect("sweep");
    assert_eq!(report.deleted_overflow, 1);

    let counts = store.count_by_status().expect("counts");
    assert_eq!(counts.failed, 4);
    assert_eq!(counts.done, 0);
}

#[test]
fn oversized_ttl_keeps_everything() {
    let store = Store::in_memory().expect("store");
    let now = Utc::now();
    seed(&store, EventStatus::Done, now - Duration::days(3650));
    seed(&store, EventStatus::Failed, now - Duration::days(3650));

    let report = cleanup::sweep_at(&store, &policy(i64::MAX, 200_000_000, 0), now).expect("sweep");
    assert_eq!(report, CleanupReport::default());
    assert_eq!(store.count_by_status().expect("counts").total(), 2);
}
