//! Read-through access to the persisted settings record.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use traffic_light_core::model::Settings;
use traffic_light_core::{Clock, ConfigError};

/// Owner of the settings record.
pub trait SettingsStore: Send + Sync {
    /// Current settings, read from the backing record on every call.
    fn settings(&self) -> Result<Settings, ConfigError>;

    /// The backing record exactly as stored, unknown keys included.
    fn record(&self) -> Result<Value, ConfigError>;

    /// Stamps `lastChangedStatusTime` with the current time, leaving every
    /// other field untouched.
    fn update_last_changed_status_time(&self) -> Result<(), ConfigError>;
}

/// Settings record kept in a JSON file.
pub struct JsonFileSettingsStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl JsonFileSettingsStore {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_record(&self) -> Result<Value, ConfigError> {
        let bytes = std::fs::read(&self.path).map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn write_record(&self, record: &Value) -> Result<(), ConfigError> {
        let write_err = |source: std::io::Error| ConfigError::Write {
            path: self.path.clone(),
            source,
        };
        let body = serde_json::to_vec_pretty(record).map_err(|e| write_err(e.into()))?;

        // Write beside the target and rename so readers never see a torn file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                let _ = std::fs::remove_file(&tmp);
                write_err(e)
            })
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn settings(&self) -> Result<Settings, ConfigError> {
        let settings: Settings =
            serde_json::from_value(self.read_record()?).map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })?;
        validate(&settings)?;
        Ok(settings)
    }

    fn record(&self) -> Result<Value, ConfigError> {
        self.read_record()
    }

    fn update_last_changed_status_time(&self) -> Result<(), ConfigError> {
        let mut record = self.read_record()?;
        let Some(fields) = record.as_object_mut() else {
            return Err(ConfigError::Invalid(format!(
                "{} does not hold a JSON object",
                self.path.display()
            )));
        };
        let now = self.clock.now_ms();
        fields.insert("lastChangedStatusTime".into(), Value::from(now));
        self.write_record(&record)?;
        tracing::debug!(path = %self.path.display(), at_ms = now, "stamped lastChangedStatusTime");
        Ok(())
    }
}

/// Checks the invariants the synchronizer relies on.
pub fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.update_state_interval == Some(0) {
        return Err(ConfigError::Invalid(
            "updateStateInterval must be greater than zero".into(),
        ));
    }
    if settings.server_url.trim().is_empty() {
        return Err(ConfigError::Invalid("serverUrl is required".into()));
    }
    Ok(())
}
