//! Error taxonomy for the memory tree core

/// Failures surfaced by the node store and the orchestrator.
///
/// Generator and summarizer failures are absent on purpose: they are absorbed
/// by the collaborator client and never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("database schema version mismatch (found {found}, expected {expected})")]
    SchemaMismatch { found: i64, expected: i64 },

    #[error("storage error: {0}")]
    Storage(String),
}

impl TreeError {
    pub fn parent_not_found(parent_id: i64) -> Self {
        TreeError::NotFound(format!("parent_id {}", parent_id))
    }

    pub fn node_not_found(node_id: i64) -> Self {
        TreeError::NotFound(format!("node {}", node_id))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TreeError::NotFound(_))
    }
}

impl From<rusqlite::Error> for TreeError {
    fn from(e: rusqlite::Error) -> Self {
        TreeError::Storage(e.to_string())
    }
}

impl From<r2d2::Error> for TreeError {
    fn from(e: r2d2::Error) -> Self {
        TreeError::Storage(format!("Failed to get connection from pool: {}", e))
    }
}

pub type TreeResult<T> = Result<T, TreeError>;
