//! Validated metronome settings
//!
//! Every tunable value enters the engine through one of these constructors,
//! so the range invariants hold no matter where the input came from (config
//! file, CLI flag, interactive edit).

use metronome_common::CueKind;
use serde::Serialize;
use std::time::Duration;

/// First beat of every measure (beats are 1-based)
pub const FIRST_BEAT: u8 = 1;

/// Tempo in beats per minute, always within [`Tempo::MIN`, `Tempo::MAX`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Tempo(u16);

impl Tempo {
    pub const MIN: u16 = 20;
    pub const MAX: u16 = 300;
    pub const DEFAULT: u16 = 60;

    /// Validate a raw tempo value
    ///
    /// NaN and zero fall back to the default; everything else is clamped to
    /// the allowed range and truncated to whole BPM.
    pub fn sanitize(value: f64) -> Self {
        if value.is_nan() || value == 0.0 {
            return Self::default();
        }
        let clamped = value.clamp(f64::from(Self::MIN), f64::from(Self::MAX));
        Self(clamped.trunc() as u16)
    }

    /// Validate an optional value; a missing value means the default
    pub fn from_input(value: Option<f64>) -> Self {
        value.map_or_else(Self::default, Self::sanitize)
    }

    /// Validate text input; non-numeric text means the default
    pub fn parse_lossy(text: &str) -> Self {
        Self::sanitize(parse_number(text))
    }

    pub fn bpm(self) -> u16 {
        self.0
    }

    /// Time between two beats (60000 / bpm milliseconds)
    pub fn beat_interval(self) -> Duration {
        Duration::from_micros(60_000_000 / u64::from(self.0))
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Number of beats in one measure, always within [`BeatsPerMeasure::MIN`, `BeatsPerMeasure::MAX`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BeatsPerMeasure(u8);

impl BeatsPerMeasure {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 16;
    pub const DEFAULT: u8 = 4;

    /// Validate a raw beats-per-measure value
    ///
    /// Only NaN falls back to the default; zero and negatives clamp to 1.
    pub fn sanitize(value: f64) -> Self {
        if value.is_nan() {
            return Self::default();
        }
        let clamped = value.clamp(f64::from(Self::MIN), f64::from(Self::MAX));
        Self(clamped.trunc() as u8)
    }

    /// Validate an optional value; a missing value means the default
    pub fn from_input(value: Option<f64>) -> Self {
        value.map_or_else(Self::default, Self::sanitize)
    }

    /// Validate text input; non-numeric text means the default
    pub fn parse_lossy(text: &str) -> Self {
        Self::sanitize(parse_number(text))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Beat that follows `beat`, wrapping from the last beat back to the first
    pub fn next_beat(self, beat: u8) -> u8 {
        if beat >= self.0 {
            FIRST_BEAT
        } else {
            beat + 1
        }
    }
}

impl Default for BeatsPerMeasure {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Playback volume, always within [0.0, 1.0]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Volume(f32);

impl Volume {
    pub const MIN: f32 = 0.0;
    pub const MAX: f32 = 1.0;
    pub const DEFAULT: f32 = 1.0;

    /// Clamp a raw volume; NaN has no meaningful clamp and yields `None`
    pub fn sanitize(value: f64) -> Option<Self> {
        if value.is_nan() {
            return None;
        }
        Some(Self(value.clamp(f64::from(Self::MIN), f64::from(Self::MAX)) as f32))
    }

    /// Validate an optional initial value; missing or NaN means the default
    pub fn from_input(value: Option<f64>) -> Self {
        value.and_then(Self::sanitize).unwrap_or_default()
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

/// Downbeat and upbeat cue identifiers
///
/// Only constructible from exactly two identifiers. An empty identifier is
/// kept (it still counts toward the pair) but leaves that cue silent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CueSources {
    pub downbeat: String,
    pub upbeat: String,
}

impl CueSources {
    pub fn new(downbeat: impl Into<String>, upbeat: impl Into<String>) -> Self {
        Self {
            downbeat: downbeat.into(),
            upbeat: upbeat.into(),
        }
    }

    /// Build from a list; anything but exactly two entries is rejected
    pub fn from_slice<S: AsRef<str>>(sources: &[S]) -> Option<Self> {
        match sources {
            [downbeat, upbeat] => Some(Self::new(downbeat.as_ref(), upbeat.as_ref())),
            _ => None,
        }
    }

    pub fn get(&self, kind: CueKind) -> &str {
        match kind {
            CueKind::Downbeat => &self.downbeat,
            CueKind::Upbeat => &self.upbeat,
        }
    }
}

/// Cue played on a given beat: the first beat is accented
pub fn cue_for_beat(beat: u8) -> CueKind {
    if beat == FIRST_BEAT {
        CueKind::Downbeat
    } else {
        CueKind::Upbeat
    }
}

fn parse_number(text: &str) -> f64 {
    text.trim().parse::<f64>().unwrap_or(f64::NAN)
}
