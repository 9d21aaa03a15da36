//! Client-side mirror of the daemon's poll loop.
//!
//! Lifecycle is `Init -> Polling -> Stopped`. On start the poller fetches
//! settings and state concurrently; once both arrive that state counts as the
//! first poll and the poll timer is armed one interval later. A separate
//! one-second timer keeps the elapsed-time label moving and never touches the
//! poll timer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use traffic_light_core::model::{CheckStateResult, Settings, DEFAULT_UPDATE_STATE_INTERVAL_MS};
use traffic_light_core::{Clock, Generation, Scheduler, TimerHandle};

use crate::source::StateSource;

/// Cadence of the elapsed-time display.
pub const DISPLAY_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Polling,
    Stopped,
}

/// Everything a renderer needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub phase: Phase,
    pub settings: Option<Settings>,
    pub check_state_result: Option<CheckStateResult>,
    /// Taken from the latest state response.
    pub last_changed_status_time: Option<i64>,
    pub mounted_at_ms: i64,
    /// Refreshed by the display tick.
    pub now_ms: i64,
    pub last_error: Option<String>,
}

impl ViewState {
    fn mounted(now_ms: i64) -> Self {
        Self {
            phase: Phase::Init,
            settings: None,
            check_state_result: None,
            last_changed_status_time: None,
            mounted_at_ms: now_ms,
            now_ms,
            last_error: None,
        }
    }

    /// Reference instant for the elapsed label: the last transition, or
    /// mount time when none is known.
    pub fn elapsed_since_ms(&self) -> i64 {
        self.last_changed_status_time.unwrap_or(self.mounted_at_ms)
    }
}

#[derive(Default)]
struct Timers {
    bootstrap: Option<TimerHandle>,
    poll: Option<TimerHandle>,
    display: Option<TimerHandle>,
}

impl Timers {
    fn cancel_all(&mut self) {
        for timer in [&mut self.bootstrap, &mut self.poll, &mut self.display] {
            if let Some(mut t) = timer.take() {
                t.cancel();
            }
        }
    }
}

/// Mirrors daemon state into a [`ViewState`] watch channel.
pub struct ClientPoller {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn StateSource>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    view: watch::Sender<ViewState>,
    generation: Generation,
    stopped: AtomicBool,
    timers: Mutex<Timers>,
}

impl ClientPoller {
    /// Arms the display tick and starts bootstrapping. A failed bootstrap is
    /// retried every [`DEFAULT_UPDATE_STATE_INTERVAL_MS`] until it succeeds or
    /// the poller is stopped.
    pub fn start(
        source: Arc<dyn StateSource>,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (view, _) = watch::channel(ViewState::mounted(clock.now_ms()));
        let inner = Arc::new(Inner {
            source,
            scheduler,
            clock,
            view,
            generation: Generation::new(),
            stopped: AtomicBool::new(false),
            timers: Mutex::new(Timers::default()),
        });

        {
            // Held while arming so a fast bootstrap cannot run ahead of us.
            let mut timers = inner.lock_timers();
            let ticker = Arc::clone(&inner);
            timers.display = Some(
                inner
                    .scheduler
                    .every(DISPLAY_TICK, Box::new(move || ticker.on_display_tick())),
            );
            let ticker = Arc::clone(&inner);
            timers.bootstrap = Some(inner.scheduler.every(
                Duration::from_millis(DEFAULT_UPDATE_STATE_INTERVAL_MS),
                Box::new(move || ticker.on_bootstrap_tick()),
            ));
        }

        Self { inner }
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.inner.view.subscribe()
    }

    /// Snapshot of the current view.
    pub fn view(&self) -> ViewState {
        self.inner.view.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.inner.view.borrow().phase
    }

    /// Cancels every timer and ignores whatever is still in flight.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.lock_timers().cancel_all();
        self.inner.view.send_modify(|v| v.phase = Phase::Stopped);
        info!("client poller stopped");
    }
}

impl Drop for ClientPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn lock_timers(&self) -> std::sync::MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn on_display_tick(&self) {
        let now = self.clock.now_ms();
        self.view.send_modify(|v| v.now_ms = now);
    }

    fn on_bootstrap_tick(self: &Arc<Self>) {
        if self.is_stopped() {
            return;
        }
        let generation = self.generation.issue();
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.bootstrap(generation).await });
    }

    async fn bootstrap(self: Arc<Self>, generation: u64) {
        let (settings, state) =
            tokio::join!(self.source.fetch_settings(), self.source.fetch_state());

        let (settings, state) = match (settings, state) {
            (Ok(settings), Ok(state)) => (settings, state),
            (Err(e), _) | (_, Err(e)) => {
                if !self.is_stopped() {
                    warn!(error = %e, "bootstrap failed; retrying");
                    self.view.send_modify(|v| v.last_error = Some(e.to_string()));
                }
                return;
            }
        };

        let mut timers = self.lock_timers();
        // Stopped, or an earlier attempt already got through.
        if self.is_stopped() || self.view.borrow().phase != Phase::Init {
            return;
        }
        if let Some(mut t) = timers.bootstrap.take() {
            t.cancel();
        }

        let interval = settings.poll_interval();
        let fresh = self.generation.is_current(generation);
        self.view.send_modify(|v| {
            v.phase = Phase::Polling;
            v.settings = Some(settings);
            if fresh {
                v.check_state_result = state.check_state_result();
                v.last_changed_status_time = state.last_changed_status_time;
            }
            v.last_error = None;
        });

        // The bootstrap state fetch was the first poll.
        let ticker = Arc::clone(&self);
        timers.poll = Some(
            self.scheduler
                .every_after(interval, Box::new(move || ticker.on_poll_tick())),
        );
        info!(interval_ms = interval.as_millis() as u64, "client poller polling");
    }

    fn on_poll_tick(self: &Arc<Self>) {
        if self.is_stopped() {
            return;
        }
        let generation = self.generation.issue();
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.update_state(generation).await });
    }

    async fn update_state(&self, generation: u64) {
        let result = self.source.fetch_state().await;

        if self.is_stopped() {
            debug!(generation, "discarding state fetch after stop");
            return;
        }

        if !self.generation.is_current(generation) {
            debug!(generation, "discarding superseded state fetch");
            return;
        }

        match result {
            Ok(state) => {
                self.view.send_modify(|v| {
                    v.check_state_result = state.check_state_result();
                    v.last_changed_status_time = state.last_changed_status_time;
                    v.last_error = None;
                });
            }
            Err(e) => {
                warn!(error = %e, generation, "state fetch failed; retrying next interval");
                self.view.send_modify(|v| v.last_error = Some(e.to_string()));
            }
        }
    }
}
