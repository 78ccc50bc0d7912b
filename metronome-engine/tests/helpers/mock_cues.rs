//! Recording cue backend
//!
//! Every player call lands in one shared log, in order, tagged with the
//! player's source. Loads and plays can be made to fail per source.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metronome_engine::error::{Error, Result};
use metronome_engine::{CueBackend, CuePlayer};

#[derive(Debug, Clone, PartialEq)]
pub enum CueCall {
    Load(String),
    Play(String),
    Pause(String),
    Seek(String, Duration),
    Volume(String, f32),
}

#[derive(Default)]
struct MockState {
    calls: Vec<CueCall>,
    failing_loads: HashSet<String>,
    failing_plays: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct MockCueBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockCueBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `load` fail for this source
    pub fn fail_load(&self, source: &str) {
        self.state.lock().unwrap().failing_loads.insert(source.to_string());
    }

    /// Make `play` fail for players of this source
    pub fn fail_play(&self, source: &str) {
        self.state.lock().unwrap().failing_plays.insert(source.to_string());
    }

    pub fn calls(&self) -> Vec<CueCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Sources in the order they were played (failed plays included)
    pub fn plays(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                CueCall::Play(source) => Some(source),
                _ => None,
            })
            .collect()
    }

    /// How many times a player was built for `source`
    pub fn loads(&self, source: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, CueCall::Load(s) if s == source))
            .count()
    }

    /// Last volume applied to a player of `source`
    pub fn volume(&self, source: &str) -> Option<f32> {
        self.calls().iter().rev().find_map(|call| match call {
            CueCall::Volume(s, volume) if s == source => Some(*volume),
            _ => None,
        })
    }

    fn record(&self, call: CueCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl CueBackend for MockCueBackend {
    fn load(&self, source: &str) -> Result<Box<dyn CuePlayer>> {
        self.record(CueCall::Load(source.to_string()));

        if self.state.lock().unwrap().failing_loads.contains(source) {
            return Err(Error::CueLoad {
                source_id: source.to_string(),
                reason: "injected load failure".to_string(),
            });
        }

        Ok(Box::new(MockCuePlayer {
            source: source.to_string(),
            backend: self.clone(),
        }))
    }
}

struct MockCuePlayer {
    source: String,
    backend: MockCueBackend,
}

impl CuePlayer for MockCuePlayer {
    fn play(&mut self) -> Result<()> {
        self.backend.record(CueCall::Play(self.source.clone()));

        if self.backend.state.lock().unwrap().failing_plays.contains(&self.source) {
            return Err(Error::CuePlayback(format!("{}: injected play failure", self.source)));
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.backend.record(CueCall::Pause(self.source.clone()));
    }

    fn seek(&mut self, position: Duration) {
        self.backend.record(CueCall::Seek(self.source.clone(), position));
    }

    fn set_volume(&mut self, volume: f32) {
        self.backend.record(CueCall::Volume(self.source.clone(), volume));
    }
}
