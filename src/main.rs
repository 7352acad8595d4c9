//! Resilient proxy entrypoint.

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use resilient_proxy::config::{load_config, ProxyConfig};
use resilient_proxy::http::HttpServer;
use resilient_proxy::lifecycle::Shutdown;
use resilient_proxy::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "resilient-proxy", version, about = "Resilient upstream proxy")]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listener.bind_address = listen;
    }

    logging::init(&config.observability.log_level);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        cache_ttl_secs = config.cache.default_ttl_secs,
        failure_threshold = config.circuit_breaker.failure_threshold,
        max_retries = config.retries.max_retries,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
