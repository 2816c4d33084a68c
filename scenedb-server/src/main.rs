//! SceneDB Server - REST API for crowd-sourced scene fingerprints
//!
//! Exposes scenedb-core over HTTP:
//! - POST /fingerprints/submit - Corroborate or withdraw a fingerprint
//! - POST /fingerprints/lookup - Find scenes by fingerprint or hash
//! - GET|PUT /scenes/{id}/fingerprints - View or reconcile a scene's set
//! - POST /scenes/query - Filtered, paginated scene search

use std::net::SocketAddr;

use anyhow::Context;
use scenedb_server::{create_router_with_config, AppState, Catalog, Config};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scenedb_server=info,scenedb_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let catalog = Catalog::from_config(&config)
        .await
        .context("Failed to initialize catalog storage")?;
    let state = AppState::new(catalog, &config);
    let app = create_router_with_config(&config, state);

    let addr = config.socket_addr();
    tracing::info!("SceneDB server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
