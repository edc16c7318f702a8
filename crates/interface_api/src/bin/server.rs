//! Coverage Adjudication Engine - API Server Binary
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin adjudicator
//!
//! # Run with a config file and environment overrides
//! ADJUDICATOR_CONFIG=adjudicator.toml ADJUDICATOR__SERVER__PORT=9090 cargo run --bin adjudicator
//! ```
//!
//! # Environment Variables
//!
//! * `ADJUDICATOR_CONFIG` - Optional TOML/JSON config file
//! * `ADJUDICATOR__SERVER__HOST` / `ADJUDICATOR__SERVER__PORT` - Bind address (default: 0.0.0.0:8080)
//! * `ADJUDICATOR__STORE__ROOT` - Claim-run store root (default: ./data/claims)
//! * `ADJUDICATOR__MODEL__ENABLED` - Enable the generative model adapter
//! * `ADJUDICATOR__LOGGING__JSON` - Emit JSON log lines
//! * `RUST_LOG` - Log filter, overrides `ADJUDICATOR__LOGGING__LEVEL`

use anyhow::Context;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use interface_api::config::{AppConfig, LoggingConfig};
use interface_api::{build_state, create_router};

/// Loads configuration, opens the store and serves until Ctrl+C or SIGTERM.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(&config.logging);

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        store_root = %config.store.root.display(),
        engine = %config.decision.engine,
        model_enabled = config.model.enabled,
        "Starting adjudication API server"
    );

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("invalid server address {}", config.server_addr()))?;

    let state = build_state(config).context("building application state")?;
    let app = create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Waits for Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed is logged and never fires, so the
/// other signal still stops the server.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
