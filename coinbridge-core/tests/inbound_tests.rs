//! Signed spend reports: verification, rejections, and the queued update.

use std::sync::Arc;

use coinbridge_core::config::InboundSettings;
use coinbridge_core::inbound::{self, Rejection};
use coinbridge_core::{EventKind, Outbox, SpendableAction, SpendableOp, Store};
use serde_json::{json, Map, Value};

const SECRET: &str = "bridge-secret";

fn settings() -> InboundSettings {
    InboundSettings {
        enabled: true,
        shared_secret: SECRET.to_string(),
        allowed_server_ids: vec!["survival-1".to_string()],
    }
}

fn outbox_with_player(spendable: i64) -> Outbox {
    let store = Arc::new(Store::in_memory().expect("store"));
    store
        .upsert_player("alice", Some("Alice_MC"), 500, spendable)
        .expect("player");
    Outbox::without_notifier(store)
}

fn signed(body: Value, secret: &str) -> String {
    let Value::Object(mut map) = body else {
        panic!("message must be an object");
    };
    let sig = inbound::sign(secret, &map);
    map.insert("signature".into(), Value::String(sig));
    Value::Object(map).to_string()
}

fn spend(player: &str, amount: i64) -> Value {
    json!({
        "type": "SPEND_COINS",
        "player": player,
        "amount": amount,
        "server_id": "survival-1",
    })
}

fn assert_untouched(outbox: &Outbox, spendable: i64) {
    let store = outbox.store();
    assert_eq!(store.count_by_status().expect("counts").total(), 0);
    let player = store.get_player("alice").expect("get").expect("player");
    assert_eq!(player.coins_spendable, spendable);
}

#[test]
fn valid_spend_deducts_and_queues_add_delta() {
    let outbox = outbox_with_player(80);
    let reply = inbound::handle_message(&outbox, &settings(), &signed(spend("alice_mc", 30), SECRET))
        .expect("handle");
    assert!(reply.is_ok(), "got: {reply:?}");

    let store = outbox.store();
    let player = store.get_player("alice").expect("get").expect("player");
    assert_eq!(player.coins_spendable, 50);

    let events = store.list_events(None, 10).expect("list");
    assert_eq!(events.len(), 1);
    let EventKind::UpdatePlayerCoins(update) = events[0].kind().expect("kind") else {
        panic!("expected update_player_coins");
    };
    assert_eq!(update.player.0, "Alice_MC");
    assert_eq!(update.spendable_action, SpendableAction::Add);
    assert_eq!(update.spendable_op(), SpendableOp::Add(-30));
    assert_eq!(update.coins_total, 500);
}

#[test]
fn overspend_floors_at_zero_and_queues_applied_change() {
    let outbox = outbox_with_player(20);
    let reply = inbound::handle_message(&outbox, &settings(), &signed(spend("Alice_MC", 50), SECRET))
        .expect("handle");
    assert!(reply.is_ok());

    let events = outbox.store().list_events(None, 10).expect("list");
    let EventKind::UpdatePlayerCoins(update) = events[0].kind().expect("kind") else {
        panic!("expected update_player_coins");
    };
    assert_eq!(update.coins_spendable, 0);
    assert_eq!(update.spendable_op(), SpendableOp::Add(-20));
}

#[test]
fn rejections_have_no_side_effects() {
    let cases: Vec<(InboundSettings, String, Rejection)> = vec![
        (
            InboundSettings {
                enabled: false,
                ..settings()
            },
            signed(spend("Alice_MC", 5), SECRET),
            Rejection::Disabled,
        ),
        (settings(), signed(spend("Alice_MC", 5), "wrong"), Rejection::InvalidSignature),
        (
            settings(),
            spend("Alice_MC", 5).to_string(),
            Rejection::InvalidSignature,
        ),
        (
            settings(),
            signed(json!({"type": "GIVE_COINS", "player": "Alice_MC", "amount": 5}), SECRET),
            Rejection::UnsupportedEvent,
        ),
        (
            settings(),
            signed(spend("Alice_MC", -5), SECRET),
            Rejection::InvalidPayload,
        ),
        (
            settings(),
            signed(json!({"type": "SPEND_COINS", "player": "Alice_MC", "amount": 5}), SECRET),
            Rejection::ServerNotAllowed,
        ),
        (
            settings(),
            signed(spend("Nobody", 5), SECRET),
            Rejection::PlayerNotFound,
        ),
        (settings(), "not json".to_string(), Rejection::InvalidPayload),
    ];

    for (settings, raw, expected) in cases {
        let outbox = outbox_with_player(80);
        let reply = inbound::handle_message(&outbox, &settings, &raw).expect("handle");
        assert_eq!(reply.error, Some(expected), "message: {raw}");
        assert_eq!(reply.status, "error");
        assert_untouched(&outbox, 80);
    }
}

#[test]
fn signature_covers_every_field_but_itself() {
    let mut map: Map<String, Value> = match spend("Alice_MC", 5) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    let sig = inbound::sign(SECRET, &map);
    map.insert("amount".into(), json!(5000));
    map.insert("signature".into(), Value::String(sig));

    let outbox = outbox_with_player(80);
    let reply = inbound::handle_message(&outbox, &settings(), &Value::Object(map).to_string())
        .expect("handle");
    assert_eq!(reply.error, Some(Rejection::InvalidSignature));
    assert_untouched(&outbox, 80);
}
