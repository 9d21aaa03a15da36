use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Poll interval used when the settings record does not specify one.
pub const DEFAULT_UPDATE_STATE_INTERVAL_MS: u64 = 10_000;

/// The persisted configuration record.
///
/// Keys are camelCase on disk and on the wire. Keys this type does not know
/// about are kept in `extra` so a read-modify-write leaves them untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Base URL of the CI server.
    #[serde(default)]
    pub server_url: String,
    /// Credentials for the CI server.
    #[serde(default)]
    pub auth: Auth,
    /// Branch whose builds are watched.
    #[serde(default)]
    pub branch: String,
    /// Build type identifiers, in display order.
    #[serde(default)]
    pub build_types: Vec<String>,
    /// Poll cadence in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_state_interval: Option<u64>,
    /// Unix epoch milliseconds of the last status transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed_status_time: Option<i64>,
    /// Unrecognised keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Settings {
    /// Poll cadence, falling back to [`DEFAULT_UPDATE_STATE_INTERVAL_MS`]
    /// when the record omits it.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.update_state_interval
                .filter(|ms| *ms > 0)
                .unwrap_or(DEFAULT_UPDATE_STATE_INTERVAL_MS),
        )
    }
}

/// CI server credentials.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Auth {
    /// Login name. Older records spell this `user`.
    #[serde(default, alias = "user")]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Aggregate health across the watched build types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Success,
    Fail,
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Success => f.write_str("success"),
            BuildStatus::Fail => f.write_str("fail"),
        }
    }
}

/// One build type as reported by the CI collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    pub id: String,
    pub display_name: String,
    /// Users investigating the failure. May be empty.
    #[serde(default)]
    pub investigators: Vec<String>,
    /// True while a newer build is in progress.
    #[serde(default)]
    pub running: bool,
}

/// Result of a single CI status query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckStateResult {
    /// Items in the order the CI collaborator returned them.
    pub items: Vec<BuildSummary>,
    pub status: BuildStatus,
}

/// Body of `GET /state.json`.
///
/// `status` is absent until the first successful poll.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StateResponse {
    #[serde(default)]
    pub items: Vec<BuildSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BuildStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed_status_time: Option<i64>,
}

impl StateResponse {
    /// Builds a response from the held snapshot and a timestamp read from
    /// the settings record.
    pub fn from_snapshot(snapshot: Option<&CheckStateResult>, last_changed: Option<i64>) -> Self {
        match snapshot {
            Some(s) => Self {
                items: s.items.clone(),
                status: Some(s.status),
                last_changed_status_time: last_changed,
            },
            None => Self {
                last_changed_status_time: last_changed,
                ..Self::default()
            },
        }
    }

    /// The poll result carried by this response, if a poll has succeeded.
    pub fn check_state_result(&self) -> Option<CheckStateResult> {
        self.status.map(|status| CheckStateResult {
            items: self.items.clone(),
            status,
        })
    }
}

/// Poll-loop health, published after every tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncHealth {
    /// Failed ticks since the last successful one.
    pub consecutive_failures: u64,
    /// Completed polls dropped in a row because a newer one was already
    /// issued. Keeps growing while the CI server is slower than the interval.
    #[serde(default)]
    pub consecutive_superseded: u64,
    /// Message of the most recent failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When a poll last succeeded (ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_ms: Option<i64>,
}
