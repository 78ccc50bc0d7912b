//! Event types for the metronome event stream

use serde::{Deserialize, Serialize};

use crate::Result;

/// Which of the two cues a beat plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueKind {
    /// First beat of the measure (accented)
    Downbeat,
    /// Any other beat of the measure
    Upbeat,
}

impl std::fmt::Display for CueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CueKind::Downbeat => write!(f, "downbeat"),
            CueKind::Upbeat => write!(f, "upbeat"),
        }
    }
}

/// Metronome event types
///
/// Broadcast by the engine whenever observable state changes. Presentation
/// layers subscribe instead of polling the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MetronomeEvent {
    /// Engine started or stopped
    RunStateChanged {
        running: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A beat was triggered
    ///
    /// `beat` is the 1-based position that was just played.
    Beat {
        beat: u8,
        beats_per_measure: u8,
        cue: CueKind,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Tempo changed (after validation)
    TempoChanged {
        bpm: u16,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Beats per measure changed (after validation)
    TimeSignatureChanged {
        beats_per_measure: u8,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Volume changed (after clamping)
    VolumeChanged {
        volume: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Cue sources replaced
    CueSourcesChanged {
        downbeat: String,
        upbeat: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Cue player rejected playback (non-fatal)
    CuePlaybackFailed {
        cue: CueKind,
        source: String,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl MetronomeEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            MetronomeEvent::RunStateChanged { .. } => "RunStateChanged",
            MetronomeEvent::Beat { .. } => "Beat",
            MetronomeEvent::TempoChanged { .. } => "TempoChanged",
            MetronomeEvent::TimeSignatureChanged { .. } => "TimeSignatureChanged",
            MetronomeEvent::VolumeChanged { .. } => "VolumeChanged",
            MetronomeEvent::CueSourcesChanged { .. } => "CueSourcesChanged",
            MetronomeEvent::CuePlaybackFailed { .. } => "CuePlaybackFailed",
        }
    }

    /// Serialize as a single JSON line (no trailing newline)
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
