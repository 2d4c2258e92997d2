//! origin-relay
//!
//! ```text
//!                       ┌──────────────────────────────────────────────┐
//!                       │                 ORIGIN RELAY                 │
//!     Client Request    │  ┌────────────┐   ┌────────┐   ┌──────────┐  │
//!     ──────────────────┼─▶│ request id │──▶│  auth  │──▶│ dispatch │  │
//!                       │  │  + trace   │   │  gate  │   └────┬─────┘  │
//!                       │  └────────────┘   └────────┘        │        │
//!                       │              ┌──────────────────────┴──┐     │
//!                       │              ▼                         ▼     │
//!                       │     ┌─────────────────┐      ┌──────────────┐│
//!                       │     │   HTTP relay    │      │  WebSocket   ││
//!                       │     │ headers + body  │      │  pair actor  ││
//!                       │     │   rewriting     │      └──────┬───────┘│
//!                       │     └────────┬────────┘             │        │
//!                       └──────────────┼──────────────────────┼────────┘
//!                                      ▼                      ▼
//!                                 upstream origin (https / wss)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use origin_relay::config::{load_config, loader::replace_port, validate_config, ConfigError};
use origin_relay::http::HttpServer;
use origin_relay::lifecycle::Shutdown;
use origin_relay::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "origin-relay")]
#[command(about = "Expose one upstream site under another domain", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides the configuration and PORT
    #[arg(short, long)]
    bind: Option<String>,

    /// Listen port, overrides the configuration and PORT
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(port) = cli.port {
        config.listener.bind_address =
            replace_port(&config.listener.bind_address, &port.to_string());
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "origin-relay starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        origin = %config.upstream.origin,
        public_domain = %config.upstream.public_domain,
        auth_enabled = config.auth.credentials().is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(err) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %err,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move { shutdown.trigger_on_signal().await });

    server.run(listener, rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
