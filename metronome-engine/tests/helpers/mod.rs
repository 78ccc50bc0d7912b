//! Test helper modules for metronome engine integration tests
//!
//! Provides reusable test infrastructure components:
//! - MockCueBackend: records every call the engine makes on its cue players
//! - TestRig: engine wired to the mock backend and a manual clock

#![allow(dead_code)]

pub mod mock_cues;

use std::sync::Arc;
use std::time::Duration;

use metronome_common::MetronomeEvent;
use metronome_engine::{EngineOptions, ManualScheduler, MetronomeEngine};
use tokio::sync::broadcast;

pub use mock_cues::{CueCall, MockCueBackend};

pub const DOWN: &str = "down.wav";
pub const UP: &str = "up.wav";

/// Engine plus the fakes it runs on
pub struct TestRig {
    pub engine: MetronomeEngine,
    pub backend: MockCueBackend,
    pub clock: Arc<ManualScheduler>,
}

impl TestRig {
    pub fn new(options: EngineOptions) -> Self {
        let backend = MockCueBackend::new();
        let clock = Arc::new(ManualScheduler::new());
        let engine = MetronomeEngine::new(options, Arc::new(backend.clone()), clock.clone());
        Self {
            engine,
            backend,
            clock,
        }
    }

    /// Rig with the default settings and the standard cue pair
    pub fn with_cues() -> Self {
        Self::new(options(None, None, &[DOWN, UP]))
    }

    /// Advance the virtual clock, returning how many timer fires ran
    pub fn advance_ms(&self, ms: u64) -> usize {
        self.clock.advance(Duration::from_millis(ms))
    }
}

pub fn options(tempo: Option<f64>, beats: Option<f64>, sources: &[&str]) -> EngineOptions {
    EngineOptions {
        tempo,
        beats_per_measure: beats,
        volume: None,
        cue_sources: sources.iter().map(|s| s.to_string()).collect(),
    }
}

/// Everything currently buffered on the receiver
pub fn drain_events(rx: &mut broadcast::Receiver<MetronomeEvent>) -> Vec<MetronomeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
