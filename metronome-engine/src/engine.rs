//! Metronome engine
//!
//! Owns the settings, the beat counter and the beat timer. All state lives
//! behind one lock shared with the timer callback, so a tick always sees a
//! consistent state and completes before the next mutation runs.
//!
//! **Beat numbering:** a tick plays the cue for `current_beat` and then
//! advances it. Right after `start()` the downbeat has already sounded and
//! `current_beat` reads 2.
//!
//! **Timer lifecycle:** every operation that affects scheduling ends in
//! [`EngineCore::rearm_timer`] or [`EngineCore::dispose_timer`]. A tempo
//! re-arm keeps the beat phase: the next beat falls one new period after the
//! last one, or right away if that moment has already passed. Each rearm
//! bumps a generation counter captured by the timer callback; a callback
//! from an older generation does nothing, which makes cancellation exact
//! even when a fire was already in flight.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use metronome_common::events::{CueKind, MetronomeEvent};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::cue::{CueBackend, CueSet};
use crate::settings::{cue_for_beat, BeatsPerMeasure, CueSources, Tempo, Volume, FIRST_BEAT};
use crate::state::{EngineOptions, EngineSnapshot, EngineState};
use crate::timer::{Scheduler, TimerHandle};

/// Event channel capacity
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Metronome engine
///
/// All operations take `&self`; share it behind an `Arc` between a UI and
/// the input handlers. Dropping the engine cancels its timer and releases
/// its cue players.
pub struct MetronomeEngine {
    core: Arc<Mutex<EngineCore>>,
    event_tx: broadcast::Sender<MetronomeEvent>,
}

/// State guarded by the engine lock
struct EngineCore {
    state: EngineState,
    cues: CueSet,
    scheduler: Arc<dyn Scheduler>,
    timer: Option<TimerHandle>,
    generation: u64,
    /// Scheduler time of the most recent tick
    last_tick: Option<Duration>,
    event_tx: broadcast::Sender<MetronomeEvent>,
}

impl MetronomeEngine {
    /// Create a stopped engine
    ///
    /// Initial values are validated like their setters. Cue sources of any
    /// length other than two are ignored and the engine starts without cues.
    pub fn new(
        options: EngineOptions,
        backend: Arc<dyn CueBackend>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = EngineState::from_options(&options);
        let sources = CueSources::from_slice(options.cue_sources.as_slice());

        info!(
            "Metronome engine created (tempo: {} BPM, beats per measure: {}, volume: {:.2}, cues: {})",
            state.tempo.bpm(),
            state.beats_per_measure.get(),
            state.volume.get(),
            if sources.is_some() { "set" } else { "none" }
        );

        let core = EngineCore {
            state,
            cues: CueSet::new(backend, sources),
            scheduler,
            timer: None,
            generation: 0,
            last_tick: None,
            event_tx: event_tx.clone(),
        };

        Self {
            core: Arc::new(Mutex::new(core)),
            event_tx,
        }
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<MetronomeEvent> {
        self.event_tx.subscribe()
    }

    /// Copy of the current observable state
    pub fn snapshot(&self) -> EngineSnapshot {
        let core = self.lock();
        EngineSnapshot {
            tempo: core.state.tempo.bpm(),
            beats_per_measure: core.state.beats_per_measure.get(),
            current_beat: core.state.current_beat,
            volume: core.state.volume.get(),
            running: core.state.running,
            cue_sources: core.cues.sources(),
        }
    }

    pub fn tempo(&self) -> u16 {
        self.lock().state.tempo.bpm()
    }

    pub fn beats_per_measure(&self) -> u8 {
        self.lock().state.beats_per_measure.get()
    }

    /// Beat the next tick will play (1-based)
    pub fn current_beat(&self) -> u8 {
        self.lock().state.current_beat
    }

    pub fn volume(&self) -> f32 {
        self.lock().state.volume.get()
    }

    pub fn is_running(&self) -> bool {
        self.lock().state.running
    }

    /// Set the tempo in BPM
    ///
    /// Clamped to 20..=300. `None`, zero and NaN reset to 60. While running
    /// the timer is re-armed at the new period, counted from the last beat.
    /// A beat that is already overdue at the new tempo fires immediately.
    pub fn set_tempo(&self, value: impl Into<Option<f64>>) {
        let tempo = Tempo::from_input(value.into());
        let mut core = self.lock();

        if core.state.tempo == tempo {
            return;
        }

        core.state.tempo = tempo;
        info!("Tempo set to {} BPM", tempo.bpm());
        core.emit(MetronomeEvent::TempoChanged {
            bpm: tempo.bpm(),
            timestamp: chrono::Utc::now(),
        });

        if core.schedule_active() {
            core.rearm_timer(self.weak(), Arm::KeepPhase);
        }
    }

    /// Set the number of beats per measure
    ///
    /// Clamped to 1..=16. `None` and NaN reset to 4. Always moves the beat
    /// counter back to the downbeat.
    pub fn set_time_signature(&self, value: impl Into<Option<f64>>) {
        let beats = BeatsPerMeasure::from_input(value.into());
        let mut core = self.lock();

        core.state.current_beat = FIRST_BEAT;
        if core.state.beats_per_measure == beats {
            return;
        }

        core.state.beats_per_measure = beats;
        info!("Time signature set to {} beats per measure", beats.get());
        core.emit(MetronomeEvent::TimeSignatureChanged {
            beats_per_measure: beats.get(),
            timestamp: chrono::Utc::now(),
        });
    }

    /// Set the volume (clamped to 0.0..=1.0)
    ///
    /// Applied to the cue players immediately, even while stopped. NaN is
    /// ignored.
    pub fn set_volume(&self, value: f64) {
        let Some(volume) = Volume::sanitize(value) else {
            debug!("Ignoring NaN volume");
            return;
        };
        let mut core = self.lock();

        core.cues.set_volume(volume);
        if core.state.volume == volume {
            return;
        }

        core.state.volume = volume;
        debug!("Volume set to {:.2}", volume.get());
        core.emit(MetronomeEvent::VolumeChanged {
            volume: volume.get(),
            timestamp: chrono::Utc::now(),
        });
    }

    /// Replace the downbeat and upbeat cue sources
    ///
    /// Anything but exactly two identifiers is ignored and `false` returned.
    /// Players for changed sources are rebuilt on next use.
    pub fn set_cue_sources<S: AsRef<str>>(&self, sources: &[S]) -> bool {
        let Some(sources) = CueSources::from_slice(sources) else {
            debug!("Ignoring cue sources: expected 2, got {}", sources.len());
            return false;
        };
        let mut core = self.lock();
        let was_active = core.schedule_active();

        if core.cues.replace(sources.clone()) {
            info!(
                "Cue sources set (downbeat: '{}', upbeat: '{}')",
                sources.downbeat, sources.upbeat
            );
            core.emit(MetronomeEvent::CueSourcesChanged {
                downbeat: sources.downbeat,
                upbeat: sources.upbeat,
                timestamp: chrono::Utc::now(),
            });
        }

        // Sources arriving while running start the beat right away
        if !was_active && core.schedule_active() {
            core.rearm_timer(self.weak(), Arm::TickNow);
        }
        true
    }

    /// Start the metronome
    ///
    /// With cue sources present the current beat sounds immediately, then
    /// every `60000 / tempo` ms. No-op while already running.
    pub fn start(&self) {
        let mut core = self.lock();
        self.start_locked(&mut core);
    }

    /// Stop the metronome
    ///
    /// Keeps the beat position, so a later `start()` resumes mid-measure.
    /// Once this returns no further tick runs.
    pub fn stop(&self) {
        let mut core = self.lock();
        Self::stop_locked(&mut core);
    }

    /// Start if stopped, stop if running
    pub fn toggle(&self) {
        let mut core = self.lock();
        if core.state.running {
            Self::stop_locked(&mut core);
        } else {
            self.start_locked(&mut core);
        }
    }

    /// Stop, cancel the timer and release the cue players
    pub fn dispose(self) {
        drop(self);
    }

    fn start_locked(&self, core: &mut EngineCore) {
        if core.state.running {
            return;
        }

        core.state.running = true;
        info!(
            "Metronome started ({} BPM, {} beats per measure, beat {})",
            core.state.tempo.bpm(),
            core.state.beats_per_measure.get(),
            core.state.current_beat
        );
        core.emit(MetronomeEvent::RunStateChanged {
            running: true,
            timestamp: chrono::Utc::now(),
        });

        if core.schedule_active() {
            core.rearm_timer(self.weak(), Arm::TickNow);
        } else {
            debug!("No cue sources, running silently");
        }
    }

    fn stop_locked(core: &mut EngineCore) {
        if !core.state.running {
            return;
        }

        core.state.running = false;
        core.dispose_timer();
        info!("Metronome stopped at beat {}", core.state.current_beat);
        core.emit(MetronomeEvent::RunStateChanged {
            running: false,
            timestamp: chrono::Utc::now(),
        });
    }

    fn weak(&self) -> Weak<Mutex<EngineCore>> {
        Arc::downgrade(&self.core)
    }

    fn lock(&self) -> MutexGuard<'_, EngineCore> {
        lock_core(&self.core)
    }
}

impl Drop for MetronomeEngine {
    fn drop(&mut self) {
        let mut core = self.lock();
        core.state.running = false;
        core.dispose_timer();
        core.cues.release();
        debug!("Metronome engine disposed");
    }
}

impl std::fmt::Debug for MetronomeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetronomeEngine")
            .field("state", &self.snapshot())
            .finish()
    }
}

/// How a re-armed timer picks its first fire
enum Arm {
    /// Play the current beat now, next one a full period later
    TickNow,
    /// Continue from the last beat at the new period
    KeepPhase,
}

fn lock_core(core: &Mutex<EngineCore>) -> MutexGuard<'_, EngineCore> {
    core.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EngineCore {
    /// Timer should be armed: running with a cue pair present
    fn schedule_active(&self) -> bool {
        self.state.running && self.cues.has_sources()
    }

    /// Tear down the current timer and build a new one at the current tempo
    fn rearm_timer(&mut self, weak: Weak<Mutex<EngineCore>>, arm: Arm) {
        self.dispose_timer();
        if !self.schedule_active() {
            return;
        }

        let period = self.state.tempo.beat_interval();
        let first = match arm {
            Arm::TickNow => {
                self.tick();
                period
            }
            Arm::KeepPhase => self.delay_to_next_beat(period),
        };

        let generation = self.generation;
        let callback = Box::new(move || {
            let Some(core) = weak.upgrade() else {
                return;
            };
            let mut core = lock_core(&core);
            if core.generation == generation {
                core.tick();
            }
        });

        self.timer = Some(self.scheduler.schedule_repeating(first, period, callback));
        debug!(
            "Beat timer armed (first: {:?}, period: {:?}, generation: {})",
            first, period, generation
        );
    }

    /// Time left until one `period` after the last tick, zero if overdue
    fn delay_to_next_beat(&self, period: Duration) -> Duration {
        match self.last_tick {
            Some(last) => (last + period).saturating_sub(self.scheduler.now()),
            None => period,
        }
    }

    /// Cancel the timer and invalidate any callback already in flight
    fn dispose_timer(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(handle) = self.timer.take() {
            self.scheduler.cancel(handle);
        }
    }

    /// Play the current beat and advance the counter
    fn tick(&mut self) {
        let volume = self.state.volume;
        let beat = self.state.current_beat;
        let cue = cue_for_beat(beat);
        self.last_tick = Some(self.scheduler.now());

        self.cues.rewind_all(volume);

        match self.cues.play(cue, volume) {
            Ok(true) => debug!("Beat {}/{} ({})", beat, self.state.beats_per_measure.get(), cue),
            Ok(false) => debug!("Beat {}/{} ({}, silent)", beat, self.state.beats_per_measure.get(), cue),
            Err(e) => {
                error!("Beat {} {} cue failed to play: {}", beat, cue, e);
                let source = self.cue_source(cue);
                self.emit(MetronomeEvent::CuePlaybackFailed {
                    cue,
                    source,
                    reason: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
            }
        }

        self.emit(MetronomeEvent::Beat {
            beat,
            beats_per_measure: self.state.beats_per_measure.get(),
            cue,
            timestamp: chrono::Utc::now(),
        });

        self.state.current_beat = self.state.beats_per_measure.next_beat(beat);
    }

    fn cue_source(&self, cue: CueKind) -> String {
        self.cues
            .sources()
            .map(|s| s.get(cue).to_string())
            .unwrap_or_default()
    }

    fn emit(&self, event: MetronomeEvent) {
        // No receivers is fine
        let _ = self.event_tx.send(event);
    }
}
