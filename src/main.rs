//! Outbound-fetch gateway.
//!
//! A single-purpose HTTP forwarding endpoint: given a target URL, optional
//! method/headers/body, and an auth token, it fetches the target resource
//! (plain HTTP client, fingerprint-spoofing client, or a headless-browser
//! render) and relays the response to the caller with CORS headers attached.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌────────────────────────────────────────────────────┐
//!                    │                  FETCH GATEWAY                     │
//!                    │                                                    │
//!   Client Request   │  ┌────────┐   ┌────────┐   ┌─────────┐            │
//!   ─────────────────┼─▶│  http  │──▶│  auth  │──▶│ payload │            │
//!                    │  │ server │   │  gate  │   │sanitizer│            │
//!                    │  └────────┘   └────────┘   └────┬────┘            │
//!                    │                                 │                  │
//!                    │                                 ▼                  │
//!                    │                          ┌─────────────┐          │
//!                    │                          │   engine    │          │
//!                    │                          │  selection  │          │
//!                    │                          └──────┬──────┘          │
//!                    │             ┌───────────────────┼──────────┐      │
//!                    │             ▼                   ▼          ▼      │
//!                    │        ┌────────┐       ┌───────────┐ ┌───────┐  │
//!                    │        │ plain  │       │fingerprint│ │browser│──┼──▶ Upstream
//!                    │        └────┬───┘       └─────┬─────┘ └───┬───┘  │
//!                    │             └───────────┬─────┴───────────┘      │
//!   Client Response  │  ┌────────┐       ┌─────▼─────┐                  │
//!   ◀────────────────┼──│  CORS  │◀──────│   relay   │                  │
//!                    │  │ policy │       │buffer/pipe│                  │
//!                    │  └────────┘       └───────────┘                  │
//!                    └────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fetch_gateway::config::loader::{apply_env_overrides, load_config};
use fetch_gateway::{GatewayConfig, HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "fetch-gateway", about = "Outbound-fetch gateway")]
struct Args {
    /// Path to a TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fetch_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("fetch-gateway v0.1.0 starting");

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            let mut config = GatewayConfig::default();
            apply_env_overrides(&mut config);
            config
        }
    };

    tracing::info!(
        bind_address = %config.listener.bind_address,
        default_engine = config.engine.default.as_str(),
        auth = if config.auth.effective_secret().is_some() { "token" } else { "open" },
        cors = if config.cors.allowed_origins.is_empty() { "wildcard" } else { "allow-list" },
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listening for connections");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            fetch_gateway::observability::metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
