//! Database schema definitions for the memory tree
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Bump to force a destructive drop-and-recreate on the next start.
pub const SCHEMA_VERSION: i64 = 1;

/// One prompt/response pair in the conversation forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryNode {
    pub id: i64,
    pub prompt: String,
    pub response: String,
    pub summary: Option<String>,
    pub parent_id: Option<i64>,
    pub depth: i64,
    pub timestamp: DateTime<Utc>,
}

impl MemoryNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Cached summary, ignoring blank values left behind by older writers.
    pub fn cached_summary(&self) -> Option<&str> {
        self.summary
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

/// Fields supplied by the caller when inserting a node.
#[derive(Debug, Clone)]
pub struct NewNode<'a> {
    pub prompt: &'a str,
    pub response: &'a str,
    pub parent_id: Option<i64>,
    pub depth: i64,
    pub timestamp: DateTime<Utc>,
}

impl<'a> NewNode<'a> {
    /// A depth-0 node with no parent.
    pub fn root(prompt: &'a str, response: &'a str) -> Self {
        Self {
            prompt,
            response,
            parent_id: None,
            depth: 0,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_nodes: i64,
    pub root_nodes: i64,
    pub summarized_nodes: i64,
    pub max_depth: i64,
    pub database_size_bytes: i64,
    pub schema_version: i64,
}

pub const VERSION_TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS _schema_version (
    id INTEGER PRIMARY KEY,
    version INTEGER NOT NULL
);
";

pub const SCHEMA_SQL: &str = "
-- Conversation nodes; parent links cascade so no subtree can be orphaned
CREATE TABLE IF NOT EXISTS memory_nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    prompt TEXT NOT NULL,
    response TEXT NOT NULL,
    summary TEXT,
    parent_id INTEGER REFERENCES memory_nodes(id) ON DELETE CASCADE,
    depth INTEGER NOT NULL DEFAULT 0,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memory_nodes_parent ON memory_nodes (parent_id);
";

pub const DROP_SQL: &str = "
DROP INDEX IF EXISTS idx_memory_nodes_parent;
DROP TABLE IF EXISTS memory_nodes;
";

pub const PRAGMAS: &str = "
PRAGMA foreign_keys = ON;
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 30000;
";
