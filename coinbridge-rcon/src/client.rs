//! Blocking RCON client.
//!
//! Every call opens a fresh connection, logs in, sends one command, reads one
//! response and closes. There is no pooling and no retry; callers decide what
//! a failure means.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use crate::console::{Console, ConnectionCheck, ProbeMode};
use crate::error::RconError;
use crate::packet::{Packet, PacketType};

/// Connect timeout for [`ProbeMode::Port`] checks.
pub const PORT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Servers may send an empty value packet ahead of the login acknowledgement.
const MAX_LOGIN_READS: usize = 2;

static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(1);

fn next_request_id() -> i32 {
    // Stay positive: -1 is the server's "auth failed" marker.
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed) & 0x3fff_ffff
}

#[derive(Debug, Clone)]
pub struct RconClient {
    host: String,
    port: u16,
    password: String,
    timeout: Duration,
}

impl RconClient {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            timeout,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn resolve(&self) -> Result<SocketAddr, RconError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|_| RconError::Resolve(self.address()))?
            .next()
            .ok_or_else(|| RconError::Resolve(self.address()))
    }

    fn connect(&self, timeout: Duration) -> Result<TcpStream, RconError> {
        let stream = TcpStream::connect_timeout(&self.resolve()?, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        Ok(stream)
    }

    fn login(&self, stream: &mut TcpStream) -> Result<(), RconError> {
        let id = next_request_id();
        Packet::new(id, PacketType::Login, self.password.as_str()).write_to(stream)?;
        for _ in 0..MAX_LOGIN_READS {
            let reply = Packet::read_from(stream)?;
            if reply.request_id == -1 {
                return Err(RconError::AuthRejected);
            }
            if reply.kind == PacketType::ExecCommand {
                if reply.request_id != id {
                    return Err(RconError::Protocol(format!(
                        "login acknowledged id {} instead of {id}",
                        reply.request_id
                    )));
                }
                return Ok(());
            }
        }
        Err(RconError::Protocol("server never acknowledged login".to_string()))
    }

    /// Run one console command and return the server's reply text.
    pub fn command(&self, command: &str) -> Result<String, RconError> {
        let mut stream = self.connect(self.timeout)?;
        self.login(&mut stream)?;

        let id = next_request_id();
        tracing::debug!(command, "sending rcon command");
        Packet::new(id, PacketType::ExecCommand, command).write_to(&mut stream)?;
        let reply = Packet::read_from(&mut stream)?;
        if reply.request_id != id {
            return Err(RconError::Protocol(format!(
                "response id {} does not match request {id}",
                reply.request_id
            )));
        }
        tracing::debug!(response = %reply.body, "rcon response");
        Ok(reply.body)
    }
}

impl Console for RconClient {
    fn ensure_objective(&self, name: &str, display: &str) -> Result<(), RconError> {
        let name = argument(name)?;
        if display.contains(['"', '\n', '\r']) {
            return Err(RconError::InvalidArgument(display.to_string()));
        }
        let display = if display.is_empty() { name } else { display };
        self.command(&format!("scoreboard objectives add {name} dummy \"{display}\""))?;
        Ok(())
    }

    fn set_score(&self, player: &str, objective: &str, value: i64) -> Result<(), RconError> {
        let (player, objective) = (argument(player)?, argument(objective)?);
        tracing::debug!(player, objective, value, "set score");
        self.command(&format!("scoreboard players set {player} {objective} {value}"))?;
        Ok(())
    }

    fn add_score(&self, player: &str, objective: &str, delta: i64) -> Result<(), RconError> {
        let (player, objective) = (argument(player)?, argument(objective)?);
        tracing::debug!(player, objective, delta, "add score");
        let command = if delta < 0 {
            format!("scoreboard players remove {player} {objective} {}", delta.unsigned_abs())
        } else {
            format!("scoreboard players add {player} {objective} {delta}")
        };
        self.command(&command)?;
        Ok(())
    }

    fn get_score(&self, player: &str, objective: &str) -> Result<Option<i64>, RconError> {
        let (player, objective) = (argument(player)?, argument(objective)?);
        let response = self.command(&format!("scoreboard players get {player} {objective}"))?;
        if response.trim().is_empty() {
            tracing::debug!(player, objective, "empty score response");
            return Ok(None);
        }
        let value = parse_score(&response);
        if value.is_none() {
            tracing::warn!(player, objective, %response, "unexpected score response");
        }
        Ok(value)
    }

    fn check_connection(&self, mode: ProbeMode) -> ConnectionCheck {
        let result = match mode {
            ProbeMode::Port => self.connect(PORT_PROBE_TIMEOUT).map(drop),
            ProbeMode::Auth => self.command("list").map(drop),
        };
        match result {
            Ok(()) => ConnectionCheck::passed(mode),
            Err(err) => ConnectionCheck::failed(mode, err),
        }
    }
}

/// Reject arguments that would split into more than one command token.
fn argument(value: &str) -> Result<&str, RconError> {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(RconError::InvalidArgument(value.to_string()));
    }
    Ok(value)
}

/// Extract `n` from `"<player> has <n> [<objective>]"`.
///
/// Player names may contain digits, so the number is taken from the token
/// after `has` rather than the first integer in the line.
pub fn parse_score(response: &str) -> Option<i64> {
    let tokens: Vec<&str> = response.split_whitespace().collect();
    tokens
        .windows(2)
        .find_map(|pair| match pair {
            ["has", value] => value.parse::<i64>().ok(),
            _ => None,
        })
}
