//! Repeating timers behind a small trait so pollers never touch a global
//! timer facility directly.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Callback run on every tick.
pub type Tick = Box<dyn FnMut() + Send + 'static>;

/// Arms repeating timers.
pub trait Scheduler: Send + Sync {
    /// Runs `tick` once right away and then every `period` until the returned
    /// handle is cancelled or dropped.
    fn every(&self, period: Duration, tick: Tick) -> TimerHandle;

    /// Like [`Scheduler::every`], but the first tick comes one `period` from
    /// now.
    fn every_after(&self, period: Duration, tick: Tick) -> TimerHandle;
}

/// Cancellation handle for a timer armed by a [`Scheduler`].
///
/// Cancelling is synchronous: once `cancel` returns no further tick starts.
/// Cancelling twice is a no-op. Dropping the handle cancels the timer.
pub struct TimerHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("armed", &self.is_armed())
            .finish()
    }
}

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// [`Scheduler`] on top of `tokio::time::interval_at`.
///
/// Must be used from within a tokio runtime. Missed ticks burst to catch up,
/// so a stalled runtime still observes one tick per elapsed period.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl TokioScheduler {
    fn spawn(first: Instant, period: Duration, mut tick: Tick) -> TimerHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(first, period);
            loop {
                interval.tick().await;
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                tick();
            }
        });

        TimerHandle::new(move || {
            cancelled.store(true, Ordering::SeqCst);
            task.abort();
        })
    }
}

impl Scheduler for TokioScheduler {
    fn every(&self, period: Duration, tick: Tick) -> TimerHandle {
        Self::spawn(Instant::now(), period.max(MIN_PERIOD), tick)
    }

    fn every_after(&self, period: Duration, tick: Tick) -> TimerHandle {
        let period = period.max(MIN_PERIOD);
        Self::spawn(Instant::now() + period, period, tick)
    }
}
