//! Cue players and the lazy per-cue player cache
//!
//! A cue player is whatever can make the downbeat or upbeat audible. The
//! engine never talks to a backend directly; [`CueSet`] builds players on
//! first use, keeps them until their source identifier changes, and applies
//! volume changes in place.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use metronome_common::CueKind;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::settings::{CueSources, Volume};

/// Playback handle for one cue source
pub trait CuePlayer: Send {
    /// Start playback from the current position (fire-and-forget)
    ///
    /// Called with the engine lock held: must return without waiting on
    /// device or stream I/O.
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    /// Move the playback position
    fn seek(&mut self, position: Duration);

    fn set_volume(&mut self, volume: f32);
}

/// Builds cue players from source identifiers
pub trait CueBackend: Send + Sync {
    fn load(&self, source: &str) -> Result<Box<dyn CuePlayer>>;
}

/// One cue source and its lazily built player
struct CueSlot {
    source: String,
    player: Option<Box<dyn CuePlayer>>,
    /// Set after a failed load so a broken source is not retried every beat
    load_failed: bool,
}

impl CueSlot {
    fn new(source: String) -> Self {
        Self {
            source,
            player: None,
            load_failed: false,
        }
    }

    /// Get the player, building it first if needed
    ///
    /// Returns `None` when the source is empty or could not be loaded.
    fn prepare(&mut self, backend: &dyn CueBackend, volume: Volume) -> Option<&mut Box<dyn CuePlayer>> {
        if self.source.is_empty() {
            return None;
        }

        if self.player.is_none() && !self.load_failed {
            match backend.load(&self.source) {
                Ok(mut player) => {
                    player.set_volume(volume.get());
                    debug!("Cue player built for '{}'", self.source);
                    self.player = Some(player);
                }
                Err(e) => {
                    warn!("Cue '{}' unavailable, staying silent: {}", self.source, e);
                    self.load_failed = true;
                }
            }
        }

        self.player.as_mut()
    }
}

struct CueSlots {
    downbeat: CueSlot,
    upbeat: CueSlot,
}

impl CueSlots {
    fn slot_mut(&mut self, kind: CueKind) -> &mut CueSlot {
        match kind {
            CueKind::Downbeat => &mut self.downbeat,
            CueKind::Upbeat => &mut self.upbeat,
        }
    }
}

/// The engine's two cue players
pub struct CueSet {
    backend: Arc<dyn CueBackend>,
    slots: Option<CueSlots>,
}

impl CueSet {
    pub fn new(backend: Arc<dyn CueBackend>, sources: Option<CueSources>) -> Self {
        let slots = sources.map(|s| CueSlots {
            downbeat: CueSlot::new(s.downbeat),
            upbeat: CueSlot::new(s.upbeat),
        });
        Self { backend, slots }
    }

    /// True once a downbeat/upbeat pair has been supplied
    pub fn has_sources(&self) -> bool {
        self.slots.is_some()
    }

    pub fn sources(&self) -> Option<CueSources> {
        self.slots
            .as_ref()
            .map(|s| CueSources::new(s.downbeat.source.clone(), s.upbeat.source.clone()))
    }

    /// Replace the sources, invalidating only players whose source changed
    ///
    /// Returns `true` if anything changed.
    pub fn replace(&mut self, sources: CueSources) -> bool {
        match &mut self.slots {
            Some(slots) => {
                let mut changed = false;
                for (slot, source) in [
                    (&mut slots.downbeat, sources.downbeat),
                    (&mut slots.upbeat, sources.upbeat),
                ] {
                    if slot.source != source {
                        *slot = CueSlot::new(source);
                        changed = true;
                    }
                }
                changed
            }
            None => {
                self.slots = Some(CueSlots {
                    downbeat: CueSlot::new(sources.downbeat),
                    upbeat: CueSlot::new(sources.upbeat),
                });
                true
            }
        }
    }

    /// Apply a new volume to every player built so far
    pub fn set_volume(&mut self, volume: Volume) {
        if let Some(slots) = &mut self.slots {
            for slot in [&mut slots.downbeat, &mut slots.upbeat] {
                if let Some(player) = slot.player.as_mut() {
                    player.set_volume(volume.get());
                }
            }
        }
    }

    /// Pause both players and rewind them to the start
    pub fn rewind_all(&mut self, volume: Volume) {
        let backend = Arc::clone(&self.backend);
        if let Some(slots) = &mut self.slots {
            for slot in [&mut slots.downbeat, &mut slots.upbeat] {
                if let Some(player) = slot.prepare(backend.as_ref(), volume) {
                    player.pause();
                    player.seek(Duration::ZERO);
                }
            }
        }
    }

    /// Play one cue
    ///
    /// `Ok(false)` means the cue has no usable player and nothing was played.
    pub fn play(&mut self, kind: CueKind, volume: Volume) -> Result<bool> {
        let backend = Arc::clone(&self.backend);
        let Some(slots) = &mut self.slots else {
            return Ok(false);
        };

        match slots.slot_mut(kind).prepare(backend.as_ref(), volume) {
            Some(player) => player.play().map(|()| true),
            None => Ok(false),
        }
    }

    /// Drop every built player, keeping the sources
    pub fn release(&mut self) {
        if let Some(slots) = &mut self.slots {
            for slot in [&mut slots.downbeat, &mut slots.upbeat] {
                if let Some(mut player) = slot.player.take() {
                    player.pause();
                }
                slot.load_failed = false;
            }
        }
    }
}

impl std::fmt::Debug for CueSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CueSet")
            .field("sources", &self.sources())
            .finish()
    }
}

/// Backend that renders cues as lines of text
///
/// Used by the CLI in place of an audio device: each played cue prints its
/// source identifier and a volume bar. Lines are handed to a writer thread,
/// so a stalled output never blocks a tick.
#[derive(Clone)]
pub struct TerminalCueBackend {
    lines: mpsc::UnboundedSender<String>,
}

impl TerminalCueBackend {
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        let (lines, _writer_thread) = spawn_line_writer(writer);
        Self { lines }
    }
}

/// Write lines on a dedicated thread until every sender is gone
fn spawn_line_writer(
    mut writer: Box<dyn Write + Send>,
) -> (mpsc::UnboundedSender<String>, std::thread::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let handle = std::thread::spawn(move || {
        while let Some(line) = rx.blocking_recv() {
            if let Err(e) = writeln!(writer, "{}", line).and_then(|()| writer.flush()) {
                warn!("Cue output failed, no further cues will be shown: {}", e);
                break;
            }
        }
    });

    (tx, handle)
}

impl CueBackend for TerminalCueBackend {
    fn load(&self, source: &str) -> Result<Box<dyn CuePlayer>> {
        Ok(Box::new(TerminalCuePlayer {
            label: source.to_string(),
            volume: Volume::DEFAULT,
            position: Duration::ZERO,
            lines: self.lines.clone(),
        }))
    }
}

/// Cue player producing one line per playback
pub struct TerminalCuePlayer {
    label: String,
    volume: f32,
    position: Duration,
    lines: mpsc::UnboundedSender<String>,
}

impl TerminalCuePlayer {
    const BAR_WIDTH: f32 = 10.0;
}

impl CuePlayer for TerminalCuePlayer {
    fn play(&mut self) -> Result<()> {
        if self.volume <= 0.0 {
            return Ok(());
        }

        let bar = "#".repeat((self.volume * Self::BAR_WIDTH).ceil() as usize);
        self.lines
            .send(format!("{:<24} {}", self.label, bar))
            .map_err(|_| Error::CuePlayback(format!("{}: output closed", self.label)))
    }

    fn pause(&mut self) {}

    fn seek(&mut self, position: Duration) {
        self.position = position;
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }
}
