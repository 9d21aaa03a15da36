#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use traffic_light_core::model::{BuildStatus, BuildSummary, CheckStateResult, Settings};
use traffic_light_core::{Clock, ConfigError, ManualClock, TokioScheduler, TransportError};
use traffic_light_daemon::ci_client::CiStatusClient;
use traffic_light_daemon::settings_store::SettingsStore;
use traffic_light_daemon::synchronizer::StateSynchronizer;

pub fn settings(interval_ms: u64, last_changed: Option<i64>) -> Settings {
    let mut s: Settings = serde_json::from_value(serde_json::json!({
        "serverUrl": "http://localhost:8112",
        "auth": { "username": "root", "password": "12345" },
        "branch": "stable",
        "buildTypes": ["Build 1", "Build 2", "Build 3"],
        "updateStateInterval": interval_ms,
    }))
    .unwrap();
    s.last_changed_status_time = last_changed;
    s
}

/// In-memory settings record with a manual clock for stamps.
pub struct FakeStore {
    settings: Mutex<Settings>,
    pub clock: ManualClock,
    pub stamps: AtomicUsize,
    pub fail_reads: AtomicBool,
}

impl FakeStore {
    pub fn new(settings: Settings) -> Arc<Self> {
        Arc::new(Self {
            settings: Mutex::new(settings),
            clock: ManualClock::new(1_000_000),
            stamps: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
        })
    }

    pub fn stamps(&self) -> usize {
        self.stamps.load(Ordering::SeqCst)
    }

    pub fn set_build_types(&self, ids: &[&str]) {
        self.settings.lock().unwrap().build_types = ids.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_interval(&self, ms: u64) {
        self.settings.lock().unwrap().update_state_interval = Some(ms);
    }

    pub fn set_last_changed(&self, ms: i64) {
        self.settings.lock().unwrap().last_changed_status_time = Some(ms);
    }
}

impl SettingsStore for FakeStore {
    fn settings(&self) -> Result<Settings, ConfigError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ConfigError::Invalid("record unavailable".into()));
        }
        Ok(self.settings.lock().unwrap().clone())
    }

    fn record(&self) -> Result<serde_json::Value, ConfigError> {
        let settings = self.settings()?;
        serde_json::to_value(settings).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    fn update_last_changed_status_time(&self) -> Result<(), ConfigError> {
        self.stamps.fetch_add(1, Ordering::SeqCst);
        self.settings.lock().unwrap().last_changed_status_time = Some(self.clock.now_ms());
        Ok(())
    }
}

/// One scripted response.
#[derive(Debug, Clone)]
pub enum Step {
    Ok(BuildStatus),
    Err,
    Delayed(Duration, BuildStatus),
}

/// CI client replaying a script; repeats the last step once it runs out.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Step>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<String>>>,
}

impl ScriptedClient {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            last: Mutex::new(Step::Ok(BuildStatus::Success)),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_seen(&self) -> Option<Vec<String>> {
        self.seen.lock().unwrap().last().cloned()
    }
}

pub fn result_for(status: BuildStatus, ids: &[String]) -> CheckStateResult {
    let items = match status {
        BuildStatus::Success => vec![],
        BuildStatus::Fail => ids
            .iter()
            .map(|id| BuildSummary {
                id: id.clone(),
                display_name: id.clone(),
                investigators: vec!["user1".into()],
                running: false,
            })
            .collect(),
    };
    CheckStateResult { items, status }
}

#[async_trait]
impl CiStatusClient for ScriptedClient {
    async fn check_state(&self, build_type_ids: &[String]) -> Result<CheckStateResult, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(build_type_ids.to_vec());

        let step = {
            let mut script = self.script.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            if let Some(next) = script.pop_front() {
                *last = next;
            }
            last.clone()
        };

        match step {
            Step::Ok(status) => Ok(result_for(status, build_type_ids)),
            Step::Err => Err(TransportError::Status {
                url: "http://ci.test/app/rest/builds".into(),
                status: 503,
            }),
            Step::Delayed(delay, status) => {
                tokio::time::sleep(delay).await;
                Ok(result_for(status, build_type_ids))
            }
        }
    }
}

pub fn start(store: Arc<FakeStore>, client: Arc<ScriptedClient>) -> StateSynchronizer {
    StateSynchronizer::start(
        store,
        move |_| client as Arc<dyn CiStatusClient>,
        &TokioScheduler,
    )
    .unwrap()
}

/// Lets spawned timer and fetch tasks run to their next await point.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

pub async fn advance_ms(ms: u64) {
    tokio::time::advance(Duration::from_millis(ms)).await;
    settle().await;
}
