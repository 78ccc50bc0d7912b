//! Repeating timers
//!
//! The engine only needs "call this every N, starting after M", a clock and
//! cancellation, so that is all the [`Scheduler`] trait exposes. [`TokioScheduler`] backs it with one
//! spawned task per timer; [`ManualScheduler`] runs on a virtual clock that
//! the host advances (frame loops, deterministic tests).

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Callback invoked on every timer fire
pub type TimerCallback = Box<dyn FnMut() + Send + 'static>;

/// Identifies one scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

/// Repeating-timer capability
pub trait Scheduler: Send + Sync {
    /// Call `callback` after `first`, then every `period`
    ///
    /// A zero `first` fires as soon as the scheduler runs.
    fn schedule_repeating(
        &self,
        first: Duration,
        period: Duration,
        callback: TimerCallback,
    ) -> TimerHandle;

    /// Monotonic time since the scheduler was created
    fn now(&self) -> Duration;

    /// Stop a timer; unknown or already cancelled handles are ignored
    fn cancel(&self, handle: TimerHandle);
}

/// Scheduler running each timer as a tokio task
pub struct TokioScheduler {
    runtime: Handle,
    origin: Instant,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl TokioScheduler {
    /// Create a scheduler bound to the given runtime
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            origin: Instant::now(),
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a scheduler bound to the runtime of the calling context
    pub fn from_current() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Runtime(format!("Timer scheduler needs a tokio runtime: {}", e)))?;
        Ok(Self::new(runtime))
    }

    /// Number of timers currently armed
    pub fn active_timers(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_repeating(
        &self,
        first: Duration,
        period: Duration,
        mut callback: TimerCallback,
    ) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now() + first;

        let task = self.runtime.spawn(async move {
            let mut ticker = interval_at(start, period);
            // A stalled runtime must never burst catch-up beats
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                trace!("Timer {} fired", id);
                callback();
            }
        });

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, task);

        debug!("Timer {} armed (first: {:?}, period: {:?})", id, first, period);
        TimerHandle(id)
    }

    fn now(&self) -> Duration {
        Instant::now().saturating_duration_since(self.origin)
    }

    fn cancel(&self, handle: TimerHandle) {
        let task = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.0);

        if let Some(task) = task {
            task.abort();
            debug!("Timer {} cancelled", handle.0);
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, task) in tasks.drain() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("active_timers", &self.active_timers())
            .finish()
    }
}

/// Scheduler driven by an explicit virtual clock
///
/// Nothing fires until [`ManualScheduler::advance`] is called. Callbacks run
/// on the caller's thread with the scheduler unlocked, so they may arm or
/// cancel timers themselves.
#[derive(Default)]
pub struct ManualScheduler {
    inner: Mutex<ManualClock>,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<u64, ManualTimer>,
}

struct ManualTimer {
    period: Duration,
    next_due: Duration,
    /// Taken out while the callback runs
    callback: Option<TimerCallback>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of armed timers
    pub fn pending_timers(&self) -> usize {
        self.lock().timers.len()
    }

    /// Move the clock forward, firing every timer that falls due in order
    ///
    /// Returns how many callbacks ran.
    pub fn advance(&self, elapsed: Duration) -> usize {
        let target = self.lock().now + elapsed;
        let mut fired = 0;

        loop {
            let (id, mut callback) = {
                let mut clock = self.lock();
                let due = clock
                    .timers
                    .iter()
                    .filter(|(_, t)| t.callback.is_some() && t.next_due <= target)
                    .min_by_key(|(id, t)| (t.next_due, **id))
                    .map(|(id, _)| *id);

                let Some(id) = due else {
                    clock.now = target;
                    break;
                };

                let timer = match clock.timers.get_mut(&id) {
                    Some(timer) => timer,
                    None => break,
                };
                let due_at = timer.next_due;
                timer.next_due += timer.period;
                let callback = match timer.callback.take() {
                    Some(callback) => callback,
                    None => break,
                };
                clock.now = due_at;
                (id, callback)
            };

            callback();
            fired += 1;

            // Re-attach unless the callback cancelled its own timer
            if let Some(timer) = self.lock().timers.get_mut(&id) {
                timer.callback = Some(callback);
            }
        }

        fired
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualClock> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(
        &self,
        first: Duration,
        period: Duration,
        callback: TimerCallback,
    ) -> TimerHandle {
        let mut clock = self.lock();
        clock.next_id += 1;
        let id = clock.next_id;
        let next_due = clock.now + first;
        clock.timers.insert(
            id,
            ManualTimer {
                period,
                next_due,
                callback: Some(callback),
            },
        );
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        self.lock().timers.remove(&handle.0);
    }

    /// Virtual time elapsed since creation
    fn now(&self) -> Duration {
        self.lock().now
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let clock = self.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &clock.now)
            .field("pending_timers", &clock.timers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn counting_callback(counter: &Arc<AtomicUsize>) -> TimerCallback {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_from_current_without_runtime_fails() {
        assert!(matches!(TokioScheduler::from_current(), Err(Error::Runtime(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fire_after_one_period() {
        let scheduler = TokioScheduler::from_current().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.schedule_repeating(ms(500), ms(500), counting_callback(&fired));

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_firing() {
        let scheduler = TokioScheduler::from_current().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let handle =
            scheduler.schedule_repeating(ms(100), ms(100), counting_callback(&fired));
        assert_eq!(scheduler.active_timers(), 1);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        scheduler.cancel(handle);
        assert_eq!(scheduler.active_timers(), 0);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        // Cancelling twice is harmless
        scheduler.cancel(handle);
    }

    #[test]
    fn test_manual_scheduler_fires_in_order() {
        let scheduler = ManualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for (name, period) in [("fast", 100), ("slow", 250)] {
            let log = Arc::clone(&log);
            scheduler.schedule_repeating(
                ms(period),
                ms(period),
                Box::new(move || log.lock().unwrap().push(name)),
            );
        }

        assert_eq!(scheduler.advance(Duration::from_millis(99)), 0);
        assert_eq!(scheduler.advance(Duration::from_millis(401)), 7);
        // Ties at 500ms resolve in arming order
        assert_eq!(
            *log.lock().unwrap(),
            vec!["fast", "fast", "slow", "fast", "fast", "fast", "slow"]
        );
        assert_eq!(scheduler.now(), Duration::from_millis(500));
    }

    #[test]
    fn test_manual_scheduler_cancel() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let handle =
            scheduler.schedule_repeating(ms(10), ms(10), counting_callback(&fired));
        scheduler.advance(Duration::from_millis(30));
        scheduler.cancel(handle);
        scheduler.advance(Duration::from_millis(30));

        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_aborts_all_timers() {
        let scheduler = TokioScheduler::from_current().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.schedule_repeating(ms(100), ms(100), counting_callback(&fired));
        scheduler.schedule_repeating(ms(100), ms(100), counting_callback(&fired));
        drop(scheduler);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_manual_first_fire_delay_is_separate_from_period() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.advance(ms(50));
        scheduler.schedule_repeating(ms(20), ms(100), counting_callback(&fired));

        assert_eq!(scheduler.advance(ms(19)), 0);
        assert_eq!(scheduler.advance(ms(1)), 1);
        assert_eq!(scheduler.now(), ms(70));
        assert_eq!(scheduler.advance(ms(99)), 0);
        assert_eq!(scheduler.advance(ms(1)), 1);
    }

    #[test]
    fn test_manual_zero_first_delay_fires_on_next_advance() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.schedule_repeating(Duration::ZERO, ms(100), counting_callback(&fired));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.advance(Duration::ZERO), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_first_fire_delay_and_clock() {
        let scheduler = TokioScheduler::from_current().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        tokio::time::sleep(ms(300)).await;
        assert!(scheduler.now() >= ms(300));

        scheduler.schedule_repeating(ms(50), ms(500), counting_callback(&fired));
        tokio::time::sleep(ms(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tokio::time::sleep(ms(480)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        tokio::time::sleep(ms(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
