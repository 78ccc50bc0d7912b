//! Engine state and its read-only snapshot

use metronome_common::config::MetronomeConfig;
use serde::Serialize;

use crate::settings::{BeatsPerMeasure, CueSources, Tempo, Volume, FIRST_BEAT};

/// Initial values for a new engine
///
/// Raw values; each goes through the same validation as its setter.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub tempo: Option<f64>,
    pub beats_per_measure: Option<f64>,
    pub volume: Option<f64>,
    /// [downbeat, upbeat]; any other length leaves the engine without cues
    pub cue_sources: Vec<String>,
}

impl EngineOptions {
    pub fn from_config(config: &MetronomeConfig) -> Self {
        Self {
            tempo: config.tempo,
            beats_per_measure: config.beats_per_measure,
            volume: config.volume,
            cue_sources: config.cue_sources.clone(),
        }
    }
}

/// Mutable engine state
///
/// `current_beat` is the beat the next tick will play and always lies in
/// `1..=beats_per_measure`.
#[derive(Debug, Clone)]
pub(crate) struct EngineState {
    pub tempo: Tempo,
    pub beats_per_measure: BeatsPerMeasure,
    pub current_beat: u8,
    pub volume: Volume,
    pub running: bool,
}

impl EngineState {
    pub fn from_options(options: &EngineOptions) -> Self {
        Self {
            tempo: Tempo::from_input(options.tempo),
            beats_per_measure: BeatsPerMeasure::from_input(options.beats_per_measure),
            current_beat: FIRST_BEAT,
            volume: Volume::from_input(options.volume),
            running: false,
        }
    }
}

/// Point-in-time copy of the engine's observable state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub tempo: u16,
    pub beats_per_measure: u8,
    pub current_beat: u8,
    pub volume: f32,
    pub running: bool,
    pub cue_sources: Option<CueSources>,
}
