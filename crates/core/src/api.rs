//! HTTP surface shared by the daemon and the monitor.

use serde::{Deserialize, Serialize};

/// Current settings record, verbatim.
pub const SETTINGS_PATH: &str = "/settings.json";

/// Latest snapshot merged with the persisted transition timestamp.
pub const STATE_PATH: &str = "/state.json";

/// Poll-loop health.
pub const HEALTH_PATH: &str = "/healthz";

/// Error body returned by the facade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
