//! # Metronome Engine Library (metronome-engine)
//!
//! Beat scheduling for a metronome: validated settings, a beat counter that
//! wraps at the measure boundary, and a repeating timer that plays an
//! accented cue on the downbeat and a plain cue on every other beat.
//!
//! **Architecture:** [`MetronomeEngine`] owns all state behind one lock and
//! talks to the outside world through two traits: [`CueBackend`] for sound
//! and [`Scheduler`] for time. State changes are broadcast as
//! [`MetronomeEvent`](metronome_common::MetronomeEvent)s.

pub mod cue;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod settings;
pub mod state;
pub mod timer;

pub use cue::{CueBackend, CuePlayer, TerminalCueBackend};
pub use debounce::Debouncer;
pub use engine::MetronomeEngine;
pub use error::{Error, Result};
pub use state::{EngineOptions, EngineSnapshot};
pub use timer::{ManualScheduler, Scheduler, TimerHandle, TokioScheduler};
