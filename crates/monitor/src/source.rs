//! Where the monitor gets settings and state from.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use traffic_light_core::api::{SETTINGS_PATH, STATE_PATH};
use traffic_light_core::model::{Settings, StateResponse};
use traffic_light_core::TransportError;

/// The two reads the monitor needs from the daemon.
#[async_trait]
pub trait StateSource: Send + Sync {
    async fn fetch_settings(&self) -> Result<Settings, TransportError>;
    async fn fetch_state(&self) -> Result<StateResponse, TransportError>;
}

/// [`StateSource`] talking to the daemon's HTTP facade.
pub struct HttpStateSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpStateSource {
    /// `base_url` like `http://127.0.0.1:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| TransportError::Request {
                url: url.clone(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(TransportError::Status {
                url,
                status: resp.status().as_u16(),
            });
        }

        resp.json::<T>().await.map_err(|e| TransportError::Decode {
            url,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl StateSource for HttpStateSource {
    async fn fetch_settings(&self) -> Result<Settings, TransportError> {
        self.get_json(SETTINGS_PATH).await
    }

    async fn fetch_state(&self) -> Result<StateResponse, TransportError> {
        self.get_json(STATE_PATH).await
    }
}
