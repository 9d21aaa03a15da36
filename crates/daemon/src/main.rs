#![forbid(unsafe_code)]

//! Traffic-light daemon binary.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use traffic_light_core::{SystemClock, TokioScheduler};
use traffic_light_daemon::{
    ci_client::CiStatusClient, config::DaemonConfig, http, settings_store::JsonFileSettingsStore,
    synchronizer::StateSynchronizer, teamcity::TeamcityClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = DaemonConfig::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&cfg.log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Arc::new(JsonFileSettingsStore::new(&cfg.settings, Arc::new(SystemClock)));

    // A missing or broken settings record is fatal here; later reads only
    // fail the request that made them.
    let sync = Arc::new(StateSynchronizer::start(
        store,
        |settings| Arc::new(TeamcityClient::new(settings)) as Arc<dyn CiStatusClient>,
        &TokioScheduler,
    )?);

    let app = http::router(Arc::clone(&sync), cfg.static_dir.clone());

    tracing::info!(listen = %cfg.listen, settings = %cfg.settings.display(), "daemon starting");
    axum::serve(tokio::net::TcpListener::bind(cfg.listen).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sync.stop();
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown requested");
}
