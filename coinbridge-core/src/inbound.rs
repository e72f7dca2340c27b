//! Signed inbound messages from the game server.
//!
//! The game server reports in-game spending as a JSON object carrying an
//! HMAC-SHA256 `signature` over the canonical form of the rest of the object
//! (keys sorted, no whitespace). A message is verified before anything is
//! touched; every rejection leaves the store unchanged.
//!
//! A successful spend lowers the local spendable balance and queues an
//! `add`-mode update with the applied (negative) delta, so the remote counter
//! converges without a read-modify-write against the game server.

use std::io::{self, Write};

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use sha2::Sha256;

use crate::config::InboundSettings;
use crate::error::StoreError;
use crate::outbox::Outbox;
use crate::types::SpendableAction;

type HmacSha256 = Hmac<Sha256>;

pub const SPEND_COINS: &str = "SPEND_COINS";

/// Machine-readable rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    Disabled,
    InvalidSignature,
    UnsupportedEvent,
    InvalidPayload,
    ServerNotAllowed,
    PlayerNotFound,
}

/// Reply sent back to the game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Rejection>,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            error: None,
        }
    }

    pub fn rejected(reason: Rejection) -> Self {
        Self {
            status: "error",
            error: Some(reason),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct SpendCoins {
    player: String,
    amount: i64,
    #[serde(default)]
    server_id: Option<String>,
}

/// Canonical text the signature covers: sorted keys, compact separators,
/// every character outside printable ASCII written as a `\uXXXX` escape
/// (UTF-16 surrogate pairs above U+FFFF).
///
/// `serde_json::Map` is ordered by key unless the `preserve_order` feature is
/// enabled, which this workspace does not do.
pub fn canonical_json(message: &Map<String, Value>) -> String {
    String::from_utf8_lossy(&canonical_bytes(message)).into_owned()
}

fn canonical_bytes(message: &Map<String, Value>) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, AsciiEscaped);
    // A `Value` written into a `Vec` cannot fail; an empty form never verifies.
    if message.serialize(&mut ser).is_err() {
        out.clear();
    }
    out
}

/// Compact formatter that keeps string output within printable ASCII.
struct AsciiEscaped;

impl Formatter for AsciiEscaped {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let bytes = fragment.as_bytes();
        let mut start = 0;
        for (at, ch) in fragment.char_indices() {
            if (' '..='~').contains(&ch) {
                continue;
            }
            writer.write_all(&bytes[start..at])?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = at + ch.len_utf8();
        }
        writer.write_all(&bytes[start..])
    }
}

/// Hex HMAC-SHA256 of the canonical form of `message`.
pub fn sign(secret: &str, message: &Map<String, Value>) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(&canonical_bytes(message));
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of `signature` against `message`.
pub fn verify(secret: &str, message: &Map<String, Value>, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(&canonical_bytes(message));
    mac.verify_slice(&expected).is_ok()
}

/// Verify and apply one raw inbound message.
///
/// Rejections come back as `Ok(Reply)` with an error code; `Err` is reserved
/// for storage failures.
pub fn handle_message(
    outbox: &Outbox,
    settings: &InboundSettings,
    raw: &str,
) -> Result<Reply, StoreError> {
    if !settings.enabled || settings.shared_secret.is_empty() {
        return Ok(Reply::rejected(Rejection::Disabled));
    }

    let Ok(Value::Object(mut message)) = serde_json::from_str::<Value>(raw) else {
        return Ok(Reply::rejected(Rejection::InvalidPayload));
    };
    let signature = match message.remove("signature") {
        Some(Value::String(sig)) => sig,
        _ => String::new(),
    };
    if !verify(&settings.shared_secret, &message, &signature) {
        tracing::warn!("inbound message rejected: invalid signature");
        return Ok(Reply::rejected(Rejection::InvalidSignature));
    }

    if message.get("type").and_then(Value::as_str) != Some(SPEND_COINS) {
        return Ok(Reply::rejected(Rejection::UnsupportedEvent));
    }

    let Ok(spend) = serde_json::from_value::<SpendCoins>(Value::Object(message)) else {
        return Ok(Reply::rejected(Rejection::InvalidPayload));
    };
    if spend.player.trim().is_empty() || spend.amount < 0 {
        return Ok(Reply::rejected(Rejection::InvalidPayload));
    }

    let allowed = spend
        .server_id
        .as_ref()
        .is_some_and(|id| settings.allowed_server_ids.iter().any(|a| a == id));
    if !allowed {
        tracing::warn!(server_id = ?spend.server_id, "inbound message from disallowed server");
        return Ok(Reply::rejected(Rejection::ServerNotAllowed));
    }

    let Some(outcome) = outbox
        .store()
        .deduct_spendable_by_remote(&spend.player, spend.amount)?
    else {
        return Ok(Reply::rejected(Rejection::PlayerNotFound));
    };

    let remote = outcome
        .player
        .remote_name
        .clone()
        .unwrap_or_else(|| spend.player.clone());
    outbox.queue_player_coins_update(
        &remote,
        outcome.player.coins_total,
        outcome.player.coins_spendable,
        "minecraft_spend",
        SpendableAction::Add,
        Some(outcome.applied_delta()),
    )?;

    tracing::info!(
        player = %remote,
        amount = spend.amount,
        spendable = outcome.player.coins_spendable,
        "inbound spend applied",
    );
    Ok(Reply::ok())
}
