use std::fs;
use std::net::TcpListener;
use std::path::Path;
use assert_cmd::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use serde_json::{json, Map, Value};
use tempfile::TempDir;

use coinbridge_core::config::{config_path, database_path};
use coinbridge_core::{inbound, Store};

const SECRET: &str = "s3cret";

fn coinbridge_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("coinbridge"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1")
        .env_remove("COINBRIDGE_RCON_PASSWORD")
        .env_remove("COINBRIDGE_INBOUND_SECRET");
    cmd
}

fn write_config(home: &Path, yaml: &str) {
    let path = config_path(home);
    fs::create_dir_all(path.parent().expect("parent")).expect("config dir");
    fs::write(path, yaml).expect("write config");
}

fn signed_spend(player: &str, amount: i64, server_id: &str) -> String {
    let mut message: Map<String, Value> = json!({
        "type": "SPEND_COINS",
        "player": player,
        "amount": amount,
        "server_id": server_id,
    })
    .as_object()
    .cloned()
    .expect("object");
    let signature = inbound::sign(SECRET, &message);
    message.insert("signature".into(), Value::String(signature));
    Value::Object(message).to_string()
}

#[test]
fn inbound_spend_deducts_and_queues_delta() {
    let home = TempDir::new().expect("home");
    write_config(
        home.path(),
        "inbound:\n  enabled: true\n  shared_secret: s3cret\n  allowed_server_ids: [survival]\n",
    );
    Store::open(&database_path(home.path()))
        .expect("store")
        .upsert_player("alice", Some("Alice_MC"), 100, 50)
        .expect("player");

    coinbridge_cmd(home.path())
        .arg("inbound")
        .write_stdin(signed_spend("Alice_MC", 30, "survival"))
        .assert()
        .success()
        .stdout(contains(r#"{"status":"ok"}"#));

    let store = Store::open(&database_path(home.path())).expect("store");
    let alice = store.get_player("alice").expect("get").expect("alice");
    assert_eq!(alice.coins_spendable, 20);
    let events = store.list_events(None, 10).expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload["spendable_action"], "add");
    assert_eq!(events[0].payload["spendable_delta"], -30);
    assert_eq!(events[0].payload["reason"], "minecraft_spend");

    coinbridge_cmd(home.path())
        .arg("inbound")
        .write_stdin(signed_spend("Alice_MC", 5, "creative"))
        .assert()
        .success()
        .stdout(contains(r#""error":"server_not_allowed""#));
}

#[test]
fn inbound_is_rejected_when_disabled() {
    let home = TempDir::new().expect("home");

    coinbridge_cmd(home.path())
        .arg("inbound")
        .write_stdin(signed_spend("Alice_MC", 30, "survival"))
        .assert()
        .success()
        .stdout(contains(r#"{"status":"error","error":"disabled"}"#));
}

#[test]
fn rcon_test_reports_unreachable_server() {
    let home = TempDir::new().expect("home");
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    write_config(
        home.path(),
        &format!("rcon:\n  host: 127.0.0.1\n  port: {port}\n  timeout_secs: 1\n"),
    );

    coinbridge_cmd(home.path())
        .args(["rcon", "test", "--port-only"])
        .assert()
        .failure()
        .stdout(contains(format!("127.0.0.1:{port} (port check)")))
        .stderr(contains("RCON connection test failed"));
}

#[test]
fn rcon_test_port_only_passes_against_listener() {
    let home = TempDir::new().expect("home");
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    write_config(
        home.path(),
        &format!("rcon:\n  host: 127.0.0.1\n  port: {port}\n"),
    );

    coinbridge_cmd(home.path())
        .args(["rcon", "test", "--port-only"])
        .assert()
        .success()
        .stdout(contains("(port check)"));
    drop(listener);
}
