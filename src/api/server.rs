use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{handle_otlp_traces, health_check, ingest_spans, stats, AppState};
use crate::config::Config;
use crate::writer::Writer;

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Span ingest
        .route("/api/spans", post(ingest_spans))
        .route("/v1/traces", post(handle_otlp_traces))
        // Stats
        .route("/stats", get(stats))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server until Ctrl-C
pub async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = config.store.open()?;
    let store_name = store.name();
    let writer = Arc::new(Writer::new(config.writer.clone(), store)?);
    tracing::info!(store = store_name, tenant = %writer.context().tenant, "Span writer ready");

    #[cfg(feature = "kafka")]
    let kafka_handle = match crate::ingest::KafkaConfig::from_env() {
        Some(kafka_config) => {
            let consumer = crate::ingest::KafkaConsumer::new(kafka_config, Arc::clone(&writer))?;
            consumer.subscribe()?;
            Some(consumer.start())
        }
        None => None,
    };

    let state = Arc::new(AppState::new(Arc::clone(&writer), store_name));
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting spanchunk server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    #[cfg(feature = "kafka")]
    if let Some(handle) = kafka_handle {
        handle.abort();
    }

    writer.close()?;
    tracing::info!("spanchunk server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received, draining in-flight requests...");
}
