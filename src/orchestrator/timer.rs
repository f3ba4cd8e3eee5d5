//! Generation-guarded repeating timer.
//!
//! Each [`RepeatingTimer::start`] bumps a generation counter and spawns a
//! task that runs the callback on a fixed cadence, passing the generation it
//! was started with. [`RepeatingTimer::cancel`] bumps the counter again and
//! aborts the task. A callback that was already running when the timer was
//! cancelled can check [`TimerGuard::is_current`] and must do nothing when it
//! returns `false`. Aborting alone is not enough: an abort only lands at the
//! callback's next `.await`.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Handle a timer callback uses to check it is still wanted.
#[derive(Debug, Clone)]
pub struct TimerGuard {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl TimerGuard {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }
}

/// A named repeating timer with at most one live task.
#[derive(Debug)]
pub struct RepeatingTimer {
    name: &'static str,
    generation: Arc<AtomicU64>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RepeatingTimer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            generation: Arc::new(AtomicU64::new(0)),
            handle: Mutex::new(None),
        }
    }

    /// Cancel any running loop, then start a new one.
    ///
    /// `callback` first runs one `period` after the call, then every
    /// `period`. Returning `ControlFlow::Break` ends the loop. Ticks missed
    /// while a callback was awaiting are skipped, not bunched up.
    pub fn start<F, Fut>(&self, period: Duration, mut callback: F) -> TimerGuard
    where
        F: FnMut(TimerGuard) -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = slot.take() {
            old.abort();
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = TimerGuard {
            generation,
            current: Arc::clone(&self.generation),
        };
        debug!("{} timer started (generation {generation})", self.name);

        let task_guard = guard.clone();
        let name = self.name;
        *slot = Some(tokio::spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticks.tick().await;
            loop {
                ticks.tick().await;
                if !task_guard.is_current() {
                    debug!("{name} timer generation {generation} is stale, exiting");
                    break;
                }
                if callback(task_guard.clone()).await.is_break() {
                    break;
                }
            }
        }));
        guard
    }

    /// Stop the loop. Safe to call when nothing is running.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
            debug!("{} timer cancelled", self.name);
        }
    }

    /// True while a loop task exists and has not finished.
    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
