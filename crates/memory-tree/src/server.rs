//! Server startup
//!
//! Opens the database, wires the LLM client into the orchestrator, seeds the
//! default root and serves the HTTP API until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    config::Config,
    context_engine::{OrchestratorConfig, TreeOrchestrator},
    llm::LlmClient,
    memory_db::{MemoryDatabase, SchemaOutcome},
    shared_state::UnifiedAppState,
};

const MAX_BODY_BYTES: usize = 1024 * 1024;

pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    crate::metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to register metrics: {}", e))?;
    cfg.print_config();

    let database = Arc::new(MemoryDatabase::new(&cfg.database_path, cfg.allow_destructive_reset)?);
    if let SchemaOutcome::Reset { from } = database.schema_outcome() {
        warn!("Existing conversation forest (schema version {}) was discarded at startup", from);
    }

    let llm = Arc::new(LlmClient::from_config(&cfg)?);
    let orchestrator = Arc::new(TreeOrchestrator::new(
        database,
        llm.clone(),
        llm,
        OrchestratorConfig {
            default_root_prompt: cfg.default_root_prompt.clone(),
        },
    ));

    if let Some(root) = orchestrator.ensure_root().await? {
        info!("Empty forest seeded with root node {}", root.id);
    }

    let addr = cfg.api_addr()?;
    let state = UnifiedAppState::new(orchestrator, cfg);
    let app = build_router(state);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub fn build_router(state: UnifiedAppState) -> axum::Router {
    use axum::{
        Router,
        routing::{delete, get, post},
    };
    use tower_http::{
        cors::{Any, CorsLayer},
        limit::RequestBodyLimitLayer,
        trace::TraceLayer,
        timeout::TimeoutLayer,
    };
    use crate::api::node_api;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let timeout = Duration::from_secs(state.config.request_timeout_seconds);

    Router::new()
        .route("/chat", post(node_api::chat))
        .route("/nodes", get(node_api::get_nodes))
        .route("/tree", get(node_api::get_tree))
        .route("/clear", delete(node_api::clear_all))
        .route("/clear/:node_id", delete(node_api::clear_subtree))
        .route("/stats", get(node_api::get_stats))
        .route("/healthz", get(|| async { "OK" }))
        .route("/metrics", get(crate::metrics::get_metrics))
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}
