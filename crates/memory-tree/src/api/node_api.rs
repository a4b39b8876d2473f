//! API endpoints for creating, browsing and pruning conversation nodes

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::Deserialize;
use tracing::{debug, info};
use validator::Validate;

use crate::api::{detail_response, error_response};
use crate::context_engine::{ChatOutcome, ClearOutcome, ContextSource, SubtreeDeletion};
use crate::forest::TreeNode;
use crate::memory_db::{DatabaseStats, MemoryNode};
use crate::metrics;
use crate::shared_state::UnifiedAppState;

/// Body of `POST /chat`
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, message = "message must not be empty"))]
    pub message: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

fn ok<T>(route: &str, body: T) -> Result<Json<T>, Response> {
    metrics::inc_request(route, "200");
    Ok(Json(body))
}

fn refresh_node_gauge(state: &UnifiedAppState) {
    match state.orchestrator.database().nodes.count() {
        Ok(count) => metrics::set_forest_nodes(count),
        Err(e) => debug!("Skipping forest_nodes update: {}", e),
    }
}

/// Answer a message and record it as a new node
pub async fn chat(
    State(state): State<UnifiedAppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatOutcome>, Response> {
    let Json(req) = payload.map_err(|rejection| {
        let status = rejection.status();
        metrics::inc_request("/chat", status.as_str());
        detail_response(status, rejection.body_text())
    })?;
    if let Err(e) = req.validate() {
        metrics::inc_request("/chat", "422");
        return Err(detail_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()));
    }
    info!("Chat request (parent {:?})", req.parent_id);

    let outcome = state
        .orchestrator
        .create_node(&req.message, req.parent_id)
        .await
        .map_err(|e| error_response("/chat", &e))?;

    if outcome.context_source == Some(ContextSource::FreshSummary) {
        metrics::inc_summaries();
    }
    refresh_node_gauge(&state);
    ok("/chat", outcome)
}

/// Flat list of every node, ordered by id
pub async fn get_nodes(
    State(state): State<UnifiedAppState>,
) -> Result<Json<Vec<MemoryNode>>, Response> {
    let nodes = state
        .orchestrator
        .list_nodes()
        .map_err(|e| error_response("/nodes", &e))?;
    debug!("Returning {} nodes", nodes.len());
    ok("/nodes", nodes)
}

/// Nested forest
pub async fn get_tree(
    State(state): State<UnifiedAppState>,
) -> Result<Json<Vec<TreeNode>>, Response> {
    let forest = state
        .orchestrator
        .get_forest()
        .map_err(|e| error_response("/tree", &e))?;
    debug!("Returning forest with {} roots", forest.len());
    ok("/tree", forest)
}

/// Wipe the forest and seed a fresh root
pub async fn clear_all(
    State(state): State<UnifiedAppState>,
) -> Result<Json<ClearOutcome>, Response> {
    let outcome = state
        .orchestrator
        .delete_all()
        .await
        .map_err(|e| error_response("/clear", &e))?;
    info!("Cleared {} nodes, new root {}", outcome.removed, outcome.root_id);
    refresh_node_gauge(&state);
    ok("/clear", outcome)
}

/// Delete a node together with all of its descendants
pub async fn clear_subtree(
    State(state): State<UnifiedAppState>,
    Path(node_id): Path<i64>,
) -> Result<Json<SubtreeDeletion>, Response> {
    let deletion = state
        .orchestrator
        .delete_subtree(node_id)
        .await
        .map_err(|e| error_response("/clear/:id", &e))?;
    refresh_node_gauge(&state);
    ok("/clear/:id", deletion)
}

pub async fn get_stats(
    State(state): State<UnifiedAppState>,
) -> Result<Json<DatabaseStats>, Response> {
    let stats = state
        .orchestrator
        .stats()
        .map_err(|e| error_response("/stats", &e))?;
    metrics::set_forest_nodes(stats.total_nodes);
    ok("/stats", stats)
}
