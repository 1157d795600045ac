//! meshircd - Mesh IRC Daemon
//!
//! Loads the configuration, starts the metrics endpoint and runs the event
//! loop until the listener fails.

use std::sync::Arc;

use meshircd::config::{self, Config, LogFormat};
use meshircd::runtime::Server;
use meshircd::{http, metrics};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "meshircd.toml".to_string());

    let config = Config::load(&config_path)
        .map_err(|e| anyhow::anyhow!("failed to load {config_path}: {e}"))?;
    init_tracing(config.logging.format);

    if let Err(problems) = config::validate(&config) {
        for problem in &problems {
            error!(path = %config_path, %problem, "invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {config_path}", problems.len());
    }

    info!(
        server = %config.server.name,
        network = %config.server.network,
        sid = %config.server.sid,
        "Starting meshircd"
    );

    metrics::init();
    match config.server.metrics_port {
        Some(0) | None => info!("Metrics endpoint disabled"),
        Some(port) => {
            tokio::spawn(http::run_http_server(port));
        }
    }

    let server = Server::bind(Arc::new(config)).await?;
    server.run().await?;
    Ok(())
}
