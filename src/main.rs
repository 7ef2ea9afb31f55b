//! Edge mediator (v1)
//!
//! An edge request mediator built with Tokio and Axum. It sits in front of a
//! site, consults a decision service for experiment and feature-flag outcomes,
//! and either redirects or serves origin content with a fixed header policy.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────────┐
//!                    │                      EDGE MEDIATOR                        │
//!                    │                                                           │
//!   Client Request   │  ┌─────────┐   ┌────────────┐   ┌──────────────────┐      │
//!   ─────────────────┼─▶│  http   │──▶│  mediator  │──▶│ decision service │──────┼──▶ Decision API
//!                    │  │ server  │   │ loop guard │   │ (hooks: context, │      │
//!                    │  └─────────┘   │  context   │   │  tracking, 3xx)  │      │
//!                    │                └─────┬──────┘   └────────┬─────────┘      │
//!                    │                      │ fail-open         │ content        │
//!                    │                      ▼                   ▼                │
//!   Client Response  │  ┌─────────┐   ┌────────────┐   ┌──────────────────┐      │
//!   ◀────────────────┼──│ policy  │◀──│ bootstrap  │◀──│      origin      │◀─────┼─── Origin
//!                    │  │ headers │   │ injection  │   └──────────────────┘      │
//!                    │  └─────────┘   └────────────┘                             │
//!                    │                                                           │
//!                    │  config · observability · resilience · lifecycle          │
//!                    └──────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use edge_mediator::config::load_config;
use edge_mediator::observability::{logging, metrics};
use edge_mediator::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "edge-mediator")]
#[command(about = "Edge request mediator for experiments and feature flags", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "EDGE_MEDIATOR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    logging::init(&config.observability);

    tracing::info!("edge-mediator v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        decision_host = %config.decision.api_host,
        analytics = config.analytics.enabled,
        request_timeout_secs = config.timeouts.request_secs,
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
    let signal = shutdown.subscribe();
    shutdown.trigger_on_ctrl_c();

    let server = HttpServer::new(config)?;
    server.run(listener, signal).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
