//! DNS-over-HTTPS forwarding proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌────────────────────────────────────────────────────────┐
//!                    │                      DOH PROXY                          │
//!   Client Request   │  ┌───────────┐   ┌────────────┐   ┌─────────────────┐  │
//!   ─────────────────┼─▶│   http    │──▶│    doh     │──▶│     cache       │  │
//!                    │  │  server   │   │ normalize  │   │ (FIFO, fixed TTL)│  │
//!                    │  └───────────┘   └────────────┘   └───────┬─────────┘  │
//!                    │                                     miss  │            │
//!                    │                                           ▼            │
//!   Client Response  │  ┌───────────┐                    ┌─────────────────┐  │
//!   ◀────────────────┼──│ response  │◀───────────────────│    upstream     │◀─┼── Upstream
//!                    │  │ + CORS    │                    │   forwarder     │  │   resolver
//!                    │  └───────────┘                    └─────────────────┘  │
//!                    └────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use doh_proxy::config::{load_config, ProxyConfig};
use doh_proxy::observability::{logging, metrics};
use doh_proxy::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "doh-proxy")]
#[command(about = "DNS-over-HTTPS forwarding proxy with response caching", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(short, long, env = "DOH_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override `upstream.url`.
    #[arg(short, long)]
    upstream: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if let Some(upstream) = args.upstream {
        config.upstream.url = upstream;
    }
    if let Err(errors) = doh_proxy::config::validation::validate_config(&config) {
        return Err(doh_proxy::config::ConfigError::Validation(errors).into());
    }

    logging::init_logging(&config.observability)?;

    tracing::info!("doh-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.url,
        cache_max_entries = config.cache.max_entries,
        cache_ttl_secs = config.cache.ttl_secs,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config.clone())?;

    if config.listener.tls.is_some() {
        let addr: SocketAddr = config.listener.bind_address.parse()?;
        server.run_tls(addr, shutdown.subscribe()).await?;
    } else {
        let listener = TcpListener::bind(&config.listener.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Listening for connections");
        server.run(listener, shutdown.subscribe()).await?;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
