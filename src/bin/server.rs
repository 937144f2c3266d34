//! Tiered-cache admin/demo binary: wires a [`TieredCache`] to a minimal
//! `axum` surface exposing health and Prometheus metrics. The cache itself
//! has no HTTP API — this binary exists to run the change-feed consumer as
//! a standalone process and observe it.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tiered_cache::global_store::memory::InMemoryGlobalStore;
use tiered_cache::global_store::GlobalStoreClient;
use tiered_cache::{config, metrics::METRICS, TieredCache};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tiered-cache server");

    let cfg = config::load().unwrap_or_else(|e| {
        error!(error = %e, "FATAL: config error — fix env vars or tiered-cache.toml");
        std::process::exit(1);
    });

    info!(
        table = %cfg.global_store.table_name,
        poll_interval_ms = cfg.change_feed.poll_interval_millis,
        slot_count = cfg.slot_table.slot_count,
        "Configuration loaded"
    );

    let global: Arc<dyn GlobalStoreClient> = Arc::new(InMemoryGlobalStore::new());
    let cache = Arc::new(TieredCache::new(&cfg, global)?);

    let bind_address =
        std::env::var("TIERED_CACHE_BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(cache.clone());

    info!(address = %bind_address, "Listening");

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    let cancel = CancellationToken::new();
    let shutdown_cache = cache.clone();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    info!("HTTP server stopped, shutting down change-feed consumer...");
    shutdown_cache.shutdown();
    cancel.cancel();

    info!("tiered-cache server shut down gracefully");
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics() -> String {
    METRICS.render()
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
        _ = cancel.cancelled() => {}
    }
}
