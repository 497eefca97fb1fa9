//! ClaimForge API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Request routing
//! - The streaming and non-streaming chat endpoints
//! - Document extraction and the data gateway
//! - Observability (logging, tracing, request ids)

mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use claimforge_common::{
    config::AppConfig,
    store::{ClaimStore, DbPool, MemStore, PgStore},
};
use claimforge_engine::{AnthropicClient, Extractor, ModelClient, Orchestrator};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, Level};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ClaimStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub extractor: Arc<Extractor>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting ClaimForge API Gateway v{}", claimforge_common::VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;

    let config = Arc::new(config);

    // Initialize the store; "memory" keeps everything in-process for
    // local development and demos
    let store: Arc<dyn ClaimStore> = if config.database.url == "memory" {
        info!("Using in-memory store");
        Arc::new(MemStore::new())
    } else {
        info!("Connecting to database...");
        let pool = DbPool::new(&config.database).await?;
        Arc::new(PgStore::new(pool))
    };

    // Model client and the engine built on it
    let model: Arc<dyn ModelClient> = Arc::new(AnthropicClient::from_config(&config.model)?);
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        model.clone(),
        config.orchestrator.max_tool_rounds as usize,
    ));
    let extractor = Arc::new(Extractor::new(model));

    // Create app state
    let state = AppState {
        config: config.clone(),
        store,
        orchestrator,
        extractor,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Chat endpoints
        .route("/chat", post(handlers::chat::chat_stream))
        .route("/chat/complete", post(handlers::chat::chat_complete))
        // Extraction endpoints
        .route("/extract", post(handlers::extract::extract_document))
        .route("/extract/batch", post(handlers::extract::extract_batch))
        // Data gateway
        .route("/data", post(handlers::data::data_operation))
        // Progress
        .route("/progress/{user_id}", get(handlers::progress::get_progress));

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        // Health endpoints stay unversioned for probes
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
