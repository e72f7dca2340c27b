//! Shared fakes for daemon integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use coinbridge_core::config::ScoreboardSettings;
use coinbridge_core::Store;
use coinbridge_daemon::Worker;
use coinbridge_rcon::{ConnectionCheck, Console, ProbeMode, RconError};

pub const TOTAL: &str = "coins_total";
pub const SPENDABLE: &str = "coins_spendable";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Ensure(String),
    Set(String, String, i64),
    Add(String, String, i64),
    Get(String, String),
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    scores: HashMap<(String, String), i64>,
    offline: bool,
}

/// In-memory scoreboard that records every call.
#[derive(Default)]
pub struct RecordingConsole {
    state: Mutex<State>,
}

impl RecordingConsole {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().expect("state").calls.clone()
    }

    pub fn score(&self, player: &str, objective: &str) -> Option<i64> {
        self.state
            .lock()
            .expect("state")
            .scores
            .get(&(player.to_string(), objective.to_string()))
            .copied()
    }

    pub fn seed(&self, player: &str, objective: &str, value: i64) {
        self.state
            .lock()
            .expect("state")
            .scores
            .insert((player.to_string(), objective.to_string()), value);
    }

    /// Every following call fails with a connection error.
    pub fn go_offline(&self) {
        self.state.lock().expect("state").offline = true;
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| pred(call)).count()
    }

    fn record(&self, call: Call) -> Result<std::sync::MutexGuard<'_, State>, RconError> {
        let mut state = self.state.lock().expect("state");
        if state.offline {
            return Err(RconError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        state.calls.push(call);
        Ok(state)
    }
}

impl Console for RecordingConsole {
    fn ensure_objective(&self, name: &str, _display: &str) -> Result<(), RconError> {
        self.record(Call::Ensure(name.to_string()))?;
        Ok(())
    }

    fn set_score(&self, player: &str, objective: &str, value: i64) -> Result<(), RconError> {
        let mut state = self.record(Call::Set(player.into(), objective.into(), value))?;
        state
            .scores
            .insert((player.to_string(), objective.to_string()), value);
        Ok(())
    }

    fn add_score(&self, player: &str, objective: &str, delta: i64) -> Result<(), RconError> {
        let mut state = self.record(Call::Add(player.into(), objective.into(), delta))?;
        *state
            .scores
            .entry((player.to_string(), objective.to_string()))
            .or_insert(0) += delta;
        Ok(())
    }

    fn get_score(&self, player: &str, objective: &str) -> Result<Option<i64>, RconError> {
        let state = self.record(Call::Get(player.into(), objective.into()))?;
        Ok(state
            .scores
            .get(&(player.to_string(), objective.to_string()))
            .copied())
    }

    fn check_connection(&self, mode: ProbeMode) -> ConnectionCheck {
        if self.state.lock().expect("state").offline {
            ConnectionCheck::failed(mode, "connection refused")
        } else {
            ConnectionCheck::passed(mode)
        }
    }
}

pub fn worker(store: &Arc<Store>, console: &Arc<RecordingConsole>) -> Worker {
    Worker::new(
        Arc::clone(store),
        Arc::clone(console) as Arc<dyn Console>,
        ScoreboardSettings::default(),
    )
}
