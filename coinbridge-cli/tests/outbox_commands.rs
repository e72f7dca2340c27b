use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use chrono::Utc;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

use coinbridge_core::config::database_path;
use coinbridge_core::{EventKind, FullSyncRequest, Store};

fn coinbridge_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("coinbridge"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1")
        .env_remove("COINBRIDGE_RCON_PASSWORD")
        .env_remove("COINBRIDGE_INBOUND_SECRET");
    cmd
}

fn stdout_json(cmd: &mut Command) -> Value {
    let assert = cmd.assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");
    serde_json::from_str(&stdout).expect("stdout is JSON")
}

#[test]
fn player_add_map_and_list() {
    let home = TempDir::new().expect("home");

    coinbridge_cmd(home.path())
        .args(["player", "add", "alice", "--total", "120", "--spendable", "80"])
        .assert()
        .success()
        .stdout(contains("saved 'alice'"));
    coinbridge_cmd(home.path())
        .args(["player", "map", "alice", "Alice_MC"])
        .assert()
        .success()
        .stdout(contains("Alice_MC"));
    coinbridge_cmd(home.path())
        .args(["player", "map", "nobody", "Ghost"])
        .assert()
        .failure()
        .stderr(contains("add the player first"));

    let players = stdout_json(coinbridge_cmd(home.path()).args(["player", "list", "--json"]));
    let players = players.as_array().expect("array");
    assert_eq!(players.len(), 1);
    assert_eq!(players[0]["name"], "alice");
    assert_eq!(players[0]["remote_name"], "Alice_MC");
    assert_eq!(players[0]["coins_spendable"], 80);
}

#[test]
fn coins_push_queues_a_pending_event() {
    let home = TempDir::new().expect("home");

    coinbridge_cmd(home.path())
        .args([
            "coins", "push", "Alice_MC", "--total", "200", "--spendable", "90", "--add", "-10",
            "--reason", "shop",
        ])
        .assert()
        .success()
        .stdout(contains("queued coin update #1"));

    let events = stdout_json(coinbridge_cmd(home.path()).args(["events", "list", "--json"]));
    let events = events.as_array().expect("array");
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event["event_type"], "update_player_coins");
    assert_eq!(event["status"], "pending");
    assert_eq!(event["payload"]["player"], "Alice_MC");
    assert_eq!(event["payload"]["spendable_action"], "add");
    assert_eq!(event["payload"]["spendable_delta"], -10);

    let shown = stdout_json(coinbridge_cmd(home.path()).args(["events", "show", "1"]));
    assert_eq!(shown["payload"]["coins_total"], 200);

    let failed = stdout_json(
        coinbridge_cmd(home.path()).args(["events", "list", "--status", "failed", "--json"]),
    );
    assert!(failed.as_array().expect("array").is_empty());
}

#[test]
fn sync_without_worker_still_queues() {
    let home = TempDir::new().expect("home");

    coinbridge_cmd(home.path())
        .args(["sync", "--reason", "nightly"])
        .assert()
        .success()
        .stdout(contains("worker not running"));

    let events = stdout_json(coinbridge_cmd(home.path()).args(["events", "list", "--json"]));
    assert_eq!(events[0]["event_type"], "sync_all");
    assert_eq!(events[0]["payload"]["reason"], "nightly");
}

#[test]
fn requeue_only_accepts_failed_or_stuck_events() {
    let home = TempDir::new().expect("home");
    {
        let store = Store::open(&database_path(home.path())).expect("store");
        let kind = EventKind::SyncAll(FullSyncRequest {
            reason: "seed".into(),
            queued_at: None,
        });
        let failed = store.insert_event(&kind, Utc::now()).expect("insert");
        store.claim_next().expect("claim").expect("claimed");
        store
            .mark_failed(failed.id, "connection refused", Utc::now())
            .expect("fail");
        store.insert_event(&kind, Utc::now()).expect("insert pending");
    }

    coinbridge_cmd(home.path())
        .args(["events", "requeue", "2"])
        .assert()
        .failure()
        .stderr(contains("failed to requeue event #2"));

    coinbridge_cmd(home.path())
        .args(["events", "requeue", "1"])
        .assert()
        .success()
        .stdout(contains("requeued #1 as #3"));

    let original = stdout_json(coinbridge_cmd(home.path()).args(["events", "show", "1"]));
    assert_eq!(original["status"], "failed", "original row is kept for the audit trail");
    assert_eq!(original["last_error"], "connection refused");
    let copy = stdout_json(coinbridge_cmd(home.path()).args(["events", "show", "3"]));
    assert_eq!(copy["status"], "pending");
    assert_eq!(copy["payload"]["reason"], "seed");
}

#[test]
fn worker_status_and_cleanup_work_offline() {
    let home = TempDir::new().expect("home");

    let status = stdout_json(coinbridge_cmd(home.path()).args(["worker", "status"]));
    assert_eq!(status["running"], false);
    assert_eq!(status["worker"]["is_running"], false);
    assert_eq!(status["events"]["pending"], 0);

    coinbridge_cmd(home.path())
        .args(["worker", "stop"])
        .assert()
        .success()
        .stdout(contains("worker is not running"));

    coinbridge_cmd(home.path())
        .arg("cleanup")
        .assert()
        .success()
        .stdout(contains("cleanup removed 0 done, 0 failed, 0 over the row cap"));

    coinbridge_cmd(home.path())
        .args(["snapshot", "list"])
        .assert()
        .success()
        .stdout(contains("No snapshots yet"));
}
