//! Error types for metronome-engine
//!
//! None of these are fatal to a running engine: cue errors are logged and
//! reported as events, runtime errors only occur while wiring things up.

use thiserror::Error;

/// Main error type for the metronome engine
#[derive(Error, Debug)]
pub enum Error {
    /// Cue source could not be turned into a player
    #[error("Failed to load cue '{source_id}': {reason}")]
    CueLoad { source_id: String, reason: String },

    /// Cue player rejected playback
    #[error("Cue playback failed: {0}")]
    CuePlayback(String),

    /// No async runtime available for timers
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Convenience Result type using metronome-engine Error
pub type Result<T> = std::result::Result<T, Error>;
