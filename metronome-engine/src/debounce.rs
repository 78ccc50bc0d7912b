//! Debounced setters
//!
//! Sliders and key repeat produce bursts of tempo/signature edits. Wrapping
//! a setter in a [`Debouncer`] applies only the last value of a burst, once
//! input has been quiet for the configured delay. The engine itself always
//! applies values immediately; debouncing is the caller's choice.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::error::{Error, Result};

/// Default quiet period before a value is applied
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Applies the most recent value after a quiet period
pub struct Debouncer<T> {
    delay: Duration,
    apply: Arc<dyn Fn(T) + Send + Sync>,
    runtime: Handle,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Create a debouncer on the current tokio runtime
    pub fn new(delay: Duration, apply: impl Fn(T) + Send + Sync + 'static) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Runtime(format!("Debouncer needs a tokio runtime: {}", e)))?;
        Ok(Self::with_runtime(runtime, delay, apply))
    }

    pub fn with_runtime(
        runtime: Handle,
        delay: Duration,
        apply: impl Fn(T) + Send + Sync + 'static,
    ) -> Self {
        Self {
            delay,
            apply: Arc::new(apply),
            runtime,
            pending: Mutex::new(None),
        }
    }

    /// Schedule `value`, replacing any value still waiting
    pub fn call(&self, value: T) {
        let apply = Arc::clone(&self.apply);
        let delay = self.delay;

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            apply(value);
        });

        if let Some(previous) = self.lock().replace(task) {
            previous.abort();
            trace!("Debounced value superseded");
        }
    }

    /// Drop the waiting value, if any
    ///
    /// Returns `true` if a value was still pending.
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(task) => {
                let was_pending = !task.is_finished();
                task.abort();
                was_pending
            }
            None => false,
        }
    }

    /// True while a value is waiting to be applied
    pub fn is_pending(&self) -> bool {
        self.lock().as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        let pending = self.pending.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = pending.take() {
            task.abort();
        }
    }
}
