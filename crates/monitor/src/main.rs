#![forbid(unsafe_code)]

//! Traffic-light monitor: polls the daemon and renders the light in a terminal.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use traffic_light_core::{SystemClock, TokioScheduler};
use traffic_light_monitor::{poller::ClientPoller, render, source::HttpStateSource};

#[derive(Parser, Debug)]
#[command(name = "traffic-light-monitor", version, about = "Terminal view of the CI traffic light")]
struct Args {
    /// Daemon base URL, e.g. http://127.0.0.1:3000
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Log level (env-filter syntax). Logs go to stderr.
    #[arg(long, default_value = "warn")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let poller = ClientPoller::start(
        Arc::new(HttpStateSource::new(args.server.clone())),
        Arc::new(TokioScheduler),
        Arc::new(SystemClock),
    );
    let mut view = poller.subscribe();
    let mut last_line = String::new();

    tracing::info!(server = %args.server, "monitor starting");
    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = render::render(&view.borrow_and_update());
                if line != last_line {
                    let mut out = std::io::stdout().lock();
                    write!(out, "\r\x1b[2K{line}")?;
                    out.flush()?;
                    last_line = line;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.stop();
    println!();
    Ok(())
}
