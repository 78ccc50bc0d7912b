//! # Metronome Common Library
//!
//! Shared code for the metronome engine and its front ends:
//! - Error types
//! - Event types (MetronomeEvent enum)
//! - Bootstrap configuration loading

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{CueKind, MetronomeEvent};
