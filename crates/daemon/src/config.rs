use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "traffic-light-daemon", version, about = "CI traffic-light status daemon")]
pub struct DaemonConfig {
    /// Listen address, e.g. 127.0.0.1:3000
    #[arg(long, default_value = "127.0.0.1:3000")]
    pub listen: SocketAddr,

    /// Settings record (JSON). Read on every request; the transition
    /// timestamp is written back into it.
    #[arg(long, default_value = "settings.json")]
    pub settings: PathBuf,

    /// Directory with a built UI, served for every path the API does not own.
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Log level (env-filter syntax).
    #[arg(long, default_value = "info")]
    pub log: String,
}
