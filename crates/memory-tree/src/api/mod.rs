//! HTTP endpoints over the conversation forest

pub mod node_api;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info};

use crate::error::TreeError;

/// Render a failure as `{"detail": ...}` with the matching status code.
pub fn error_response(route: &str, err: &TreeError) -> Response {
    let status = match err {
        TreeError::NotFound(_) => {
            info!("{}: {}", route, err);
            StatusCode::NOT_FOUND
        }
        TreeError::SchemaMismatch { .. } | TreeError::Storage(_) => {
            error!("{}: {}", route, err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    crate::metrics::inc_request(route, status.as_str());
    detail_response(status, err.to_string())
}

pub fn detail_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "detail": detail.into() }))).into_response()
}
