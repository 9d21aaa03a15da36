use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use thiserror::Error;
use tower_http::{services::ServeDir, trace::TraceLayer};
use traffic_light_core::api::{ErrorBody, HEALTH_PATH, SETTINGS_PATH, STATE_PATH};
use serde_json::Value;
use traffic_light_core::model::{StateResponse, SyncHealth};
use traffic_light_core::ConfigError;

use crate::synchronizer::StateSynchronizer;

#[derive(Clone)]
pub struct AppState {
    sync: Arc<StateSynchronizer>,
}

/// Routes for the monitor. `static_dir`, when given, is served for every
/// other path.
pub fn router(sync: Arc<StateSynchronizer>, static_dir: Option<PathBuf>) -> Router {
    let state = AppState { sync };
    let mut app = Router::new()
        .route(SETTINGS_PATH, get(settings))
        .route(STATE_PATH, get(current_state))
        .route(HEALTH_PATH, get(healthz))
        .with_state(state);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }
    app.layer(TraceLayer::new_for_http())
}

/// The record as stored, unknown keys and spellings included.
async fn settings(State(st): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(st.sync.settings_store().record()?))
}

async fn current_state(State(st): State<AppState>) -> Result<Json<StateResponse>, ApiError> {
    Ok(Json(st.sync.state().await?))
}

async fn healthz(State(st): State<AppState>) -> Json<SyncHealth> {
    let health = st.sync.health().borrow().clone();
    Json(health)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        let code = match self {
            ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (code, body).into_response()
    }
}
