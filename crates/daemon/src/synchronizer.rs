//! Server-side poller: keeps the latest CI snapshot and stamps transitions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};
use traffic_light_core::model::{CheckStateResult, Settings, StateResponse, SyncHealth};
use traffic_light_core::{now_ms, ConfigError, Generation, Scheduler, TimerHandle, TransportError};

use crate::ci_client::CiStatusClient;
use crate::settings_store::SettingsStore;

/// Superseded polls in a row before the synchronizer starts warning.
pub const STARVED_AFTER: u64 = 3;

/// Why a tick did not produce a new snapshot.
#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// What a completed fetch did to the held snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Snapshot replaced; `transition` is true when the timestamp was stamped.
    Applied { transition: bool },
    /// A newer fetch was issued meanwhile; result dropped.
    Stale,
    /// The synchronizer was stopped while the fetch was in flight.
    Stopped,
}

/// Polls the CI server on a fixed cadence and republishes its status.
///
/// The interval and the CI client are fixed at construction. Build types are
/// re-read from the settings store on every tick.
pub struct StateSynchronizer {
    inner: Arc<Inner>,
    interval: Duration,
    timer: Mutex<Option<TimerHandle>>,
}

struct Inner {
    store: Arc<dyn SettingsStore>,
    client: Arc<dyn CiStatusClient>,
    snapshot: RwLock<Option<CheckStateResult>>,
    generation: Generation,
    stopped: AtomicBool,
    health: watch::Sender<SyncHealth>,
}

impl StateSynchronizer {
    /// Reads settings once, binds a CI client to them via `connect` and arms
    /// the poll timer. The first poll is issued right away.
    pub fn start<F>(
        store: Arc<dyn SettingsStore>,
        connect: F,
        scheduler: &dyn Scheduler,
    ) -> Result<Self, ConfigError>
    where
        F: FnOnce(&Settings) -> Arc<dyn CiStatusClient>,
    {
        let settings = store.settings()?;
        let interval = settings.poll_interval();
        let client = connect(&settings);
        let (health, _) = watch::channel(SyncHealth::default());

        let inner = Arc::new(Inner {
            store,
            client,
            snapshot: RwLock::new(None),
            generation: Generation::new(),
            stopped: AtomicBool::new(false),
            health,
        });

        let ticker = Arc::clone(&inner);
        let timer = scheduler.every(interval, Box::new(move || ticker.on_tick()));

        info!(
            interval_ms = interval.as_millis() as u64,
            build_types = ?settings.build_types,
            "state synchronizer started"
        );

        Ok(Self {
            inner,
            interval,
            timer: Mutex::new(Some(timer)),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn settings_store(&self) -> &Arc<dyn SettingsStore> {
        &self.inner.store
    }

    /// Last successful snapshot, with `lastChangedStatusTime` read from the
    /// settings store at call time.
    pub async fn state(&self) -> Result<StateResponse, ConfigError> {
        let snapshot = self.inner.snapshot.read().await.clone();
        let last_changed = self.inner.store.settings()?.last_changed_status_time;
        Ok(StateResponse::from_snapshot(snapshot.as_ref(), last_changed))
    }

    /// Receiver for per-tick health updates.
    pub fn health(&self) -> watch::Receiver<SyncHealth> {
        self.inner.health.subscribe()
    }

    /// Cancels the timer. In-flight fetches finish but are not applied.
    /// Calling this more than once is harmless.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        let timer = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut timer) = timer {
            timer.cancel();
            info!("state synchronizer stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for StateSynchronizer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn on_tick(self: &Arc<Self>) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let generation = self.generation.issue();
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.run_tick(generation).await });
    }

    async fn run_tick(&self, generation: u64) {
        match self.poll(generation).await {
            Ok(TickOutcome::Applied { transition }) => {
                self.health.send_modify(|h| {
                    h.consecutive_failures = 0;
                    h.consecutive_superseded = 0;
                    h.last_success_ms = Some(now_ms());
                });
                debug!(generation, transition, "state poll applied");
            }
            Ok(TickOutcome::Stale) => {
                let mut superseded = 0;
                self.health.send_modify(|h| {
                    h.consecutive_superseded += 1;
                    superseded = h.consecutive_superseded;
                });
                if superseded >= STARVED_AFTER {
                    warn!(
                        generation,
                        superseded,
                        "CI server is slower than the poll interval; dropping superseded poll"
                    );
                } else {
                    debug!(generation, "discarding superseded state poll");
                }
            }
            Ok(TickOutcome::Stopped) => debug!(generation, "discarding state poll after stop"),
            Err(e) => {
                if self.stopped.load(Ordering::SeqCst) {
                    return;
                }
                warn!(error = %e, generation, "state poll failed; retrying next interval");
                self.health.send_modify(|h| {
                    h.consecutive_failures += 1;
                    h.last_error = Some(e.to_string());
                });
            }
        }
    }

    async fn poll(&self, generation: u64) -> Result<TickOutcome, TickError> {
        let settings = self.store.settings()?;
        let result = self.client.check_state(&settings.build_types).await?;
        self.apply(generation, result, settings.last_changed_status_time.is_none())
            .await
    }

    async fn apply(
        &self,
        generation: u64,
        result: CheckStateResult,
        never_stamped: bool,
    ) -> Result<TickOutcome, TickError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(TickOutcome::Stopped);
        }
        if !self.generation.is_current(generation) {
            return Ok(TickOutcome::Stale);
        }

        let mut held = self.snapshot.write().await;
        let transition = match held.as_ref() {
            Some(previous) => previous.status != result.status,
            // First observation after start: only stamp when the record has
            // never been stamped, so a restart keeps the persisted time.
            None => never_stamped,
        };

        let stamped = if transition {
            info!(
                from = ?held.as_ref().map(|s| s.status),
                to = %result.status,
                "build status changed"
            );
            self.store.update_last_changed_status_time()
        } else {
            Ok(())
        };

        *held = Some(result);
        drop(held);

        stamped?;
        Ok(TickOutcome::Applied { transition })
    }
}
