//! OAuth + WebSocket forwarding proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                 OAUTH PROXY                  │
//!                         │                                              │
//!     Client (tunnel)     │  ┌──────────┐    ┌───────────┐               │
//!     ────────────────────┼─▶│   net    │───▶│   head    │               │
//!                         │  │ listener │    │  sniffer  │               │
//!                         │  └──────────┘    └─────┬─────┘               │
//!                         │           Upgrade? ┌───┴────┐                │
//!                         │                yes ▼        ▼ no             │
//!                         │        ┌───────────┐  ┌─────────────┐        │
//!                         │        │ websocket │  │ hyper+axum  │        │
//!                         │        │  splicer  │  │  forwarder  │        │
//!                         │        └─────┬─────┘  └──────┬──────┘        │
//!                         │              │   routing     │               │
//!                         │              │ (state fix) ◀─┘               │
//!                         │              ▼               ▼               │
//!                         │        raw TCP bytes     HTTP request ───────┼──▶ Backend
//!                         └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use oauth_proxy::config::{parse_config, validate_config, ConfigError, ProxyConfig};
use oauth_proxy::lifecycle::{spawn_signal_listener, Shutdown};
use oauth_proxy::net::Listener;
use oauth_proxy::observability::{init_logging, metrics};
use oauth_proxy::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "oauth-proxy")]
#[command(about = "Repairs OAuth callback state and forwards HTTP/WebSocket traffic to a backend", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides `listener.bind_address`
    #[arg(short, long)]
    listen: Option<String>,

    /// Backend host, overrides `backend.host`
    #[arg(long)]
    backend_host: Option<String>,

    /// Backend port, overrides `backend.port`
    #[arg(long)]
    backend_port: Option<u16>,
}

impl Cli {
    fn load(&self) -> Result<ProxyConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => parse_config(path)?,
            None => ProxyConfig::default(),
        };

        if let Some(listen) = &self.listen {
            config.listener.bind_address = listen.clone();
        }
        if let Some(host) = &self.backend_host {
            config.backend.host = host.clone();
        }
        if let Some(port) = self.backend_port {
            config.backend.port = port;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    init_logging(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.listener.bind_address,
        backend = %config.backend.origin(),
        callback_path = %config.oauth.callback_path,
        state_param = %config.oauth.state_param,
        "oauth-proxy starting: OAuth state repair, WebSocket forwarding, Origin rewrite"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(error = %e, "Failed to start metrics endpoint");
        }
    }

    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    spawn_signal_listener(&shutdown);

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
