//! Network-monitor reconciler entry point.

use clap::Parser;
use netmon_reconciler::config::Config;
use netmon_reconciler::lifecycle;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    let log_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("netmon_reconciler={}", log_level).into()),
        )
        .init();

    info!("starting network-monitor reconciler v{}", env!("CARGO_PKG_VERSION"));

    match lifecycle::run(config).await {
        Ok(true) => std::process::exit(0),
        Ok(false) => {
            error!("shutdown did not drain cleanly within the deadline");
            std::process::exit(1);
        }
        Err(e) => {
            error!("fatal error: {}", e);
            std::process::exit(1);
        }
    }
}
