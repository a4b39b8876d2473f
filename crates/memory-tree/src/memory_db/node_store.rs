//! Node storage and retrieval operations
use crate::error::{TreeError, TreeResult};
use crate::memory_db::schema::*;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, info, warn};
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

const NODE_COLUMNS: &str = "id, prompt, response, summary, parent_id, depth, timestamp";

/// Keeps bulk deletes under SQLite's bound-parameter limit.
const DELETE_CHUNK: usize = 500;

/// CRUD over the `memory_nodes` table.
///
/// Every mutating method commits its own transaction. The `*_with_conn`
/// variants run on a caller-owned connection or transaction so several steps
/// can share one commit.
pub struct NodeStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl NodeStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> TreeResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Store a new node and return it with its assigned id
    pub fn insert(&self, node: &NewNode<'_>) -> TreeResult<MemoryNode> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stored = Self::insert_with_conn(&tx, node)?;
        tx.commit()?;
        debug!("Stored node {} (parent {:?}, depth {})", stored.id, stored.parent_id, stored.depth);
        Ok(stored)
    }

    pub fn insert_with_conn(conn: &Connection, node: &NewNode<'_>) -> TreeResult<MemoryNode> {
        let result = conn.execute(
            "INSERT INTO memory_nodes (prompt, response, summary, parent_id, depth, timestamp)
             VALUES (?1, ?2, NULL, ?3, ?4, ?5)",
            params![
                node.prompt,
                node.response,
                node.parent_id,
                node.depth,
                node.timestamp.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => {}
            // The parent vanished between lookup and insert.
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation && node.parent_id.is_some() =>
            {
                return Err(TreeError::parent_not_found(node.parent_id.unwrap_or_default()));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(MemoryNode {
            id: conn.last_insert_rowid(),
            prompt: node.prompt.to_string(),
            response: node.response.to_string(),
            summary: None,
            parent_id: node.parent_id,
            depth: node.depth,
            timestamp: node.timestamp,
        })
    }

    pub fn get(&self, id: i64) -> TreeResult<Option<MemoryNode>> {
        let conn = self.get_conn()?;
        Self::get_with_conn(&conn, id)
    }

    pub fn get_with_conn(conn: &Connection, id: i64) -> TreeResult<Option<MemoryNode>> {
        let node = conn
            .query_row(
                &format!("SELECT {} FROM memory_nodes WHERE id = ?1", NODE_COLUMNS),
                [id],
                Self::row_to_node,
            )
            .optional()?;
        Ok(node)
    }

    pub fn list_all_ordered_by_id(&self) -> TreeResult<Vec<MemoryNode>> {
        let conn = self.get_conn()?;
        Self::list_all_with_conn(&conn)
    }

    pub fn list_all_with_conn(conn: &Connection) -> TreeResult<Vec<MemoryNode>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM memory_nodes ORDER BY id",
            NODE_COLUMNS
        ))?;
        let nodes = stmt
            .query_map([], Self::row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    pub fn count(&self) -> TreeResult<i64> {
        let conn = self.get_conn()?;
        Self::count_with_conn(&conn)
    }

    pub fn count_with_conn(conn: &Connection) -> TreeResult<i64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM memory_nodes", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Remove the given ids. Ids that are already gone are skipped, so applying
    /// the same set twice leaves the same state as applying it once.
    ///
    /// The foreign key cascade also removes anything still hanging beneath a
    /// deleted id; callers pass closed subtrees so nothing extra goes.
    pub fn delete_many(&self, ids: &[i64]) -> TreeResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = Self::delete_many_with_conn(&tx, ids)?;
        tx.commit()?;
        Ok(deleted)
    }

    /// Returns the number of rows removed, cascaded descendants included.
    pub fn delete_many_with_conn(conn: &Connection, ids: &[i64]) -> TreeResult<usize> {
        // SQLite's change count skips rows removed by the cascade.
        let before = Self::count_with_conn(conn)?;
        for chunk in ids.chunks(DELETE_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let query = format!("DELETE FROM memory_nodes WHERE id IN ({})", placeholders);
            let mut stmt = conn.prepare(&query)?;
            stmt.execute(rusqlite::params_from_iter(chunk))?;
        }
        let deleted = (before - Self::count_with_conn(conn)?) as usize;
        debug!("Deleted {} nodes for {} requested ids", deleted, ids.len());
        Ok(deleted)
    }

    pub fn delete_all(&self) -> TreeResult<usize> {
        let conn = self.get_conn()?;
        Self::delete_all_with_conn(&conn)
    }

    pub fn delete_all_with_conn(conn: &Connection) -> TreeResult<usize> {
        let before = Self::count_with_conn(conn)?;
        conn.execute("DELETE FROM memory_nodes", [])?;
        Ok(before as usize)
    }

    /// Clear the whole forest and seed a single root, in one commit, so no
    /// reader ever observes an empty forest.
    pub fn replace_forest_with_root(&self, prompt: &str, response: &str) -> TreeResult<(usize, MemoryNode)> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let deleted = Self::delete_all_with_conn(&tx)?;
        let root = Self::insert_with_conn(&tx, &NewNode::root(prompt, response))?;
        tx.commit()?;
        info!("Cleared {} nodes and seeded root {}", deleted, root.id);
        Ok((deleted, root))
    }

    /// Set the cached summary. Returns `false` if the node no longer exists.
    pub fn update_summary(&self, id: i64, text: &str) -> TreeResult<bool> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE memory_nodes SET summary = ?1 WHERE id = ?2",
            params![text, id],
        )?;
        Ok(updated > 0)
    }

    /// Drop the cached summary so the next long-context request recomputes it
    pub fn clear_summary(&self, id: i64) -> TreeResult<bool> {
        let conn = self.get_conn()?;
        let updated = conn.execute("UPDATE memory_nodes SET summary = NULL WHERE id = ?1", [id])?;
        Ok(updated > 0)
    }

    fn parse_datetime_safe(datetime_str: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(datetime_str) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S") {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S%.f") {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
        None
    }

    fn row_to_node(row: &Row) -> rusqlite::Result<MemoryNode> {
        let id: i64 = row.get(0)?;
        let timestamp = Self::parse_datetime_safe(&row.get::<_, String>(6)?)
            .unwrap_or_else(|| { warn!("Failed parse timestamp of node {}", id); Utc::now() });

        Ok(MemoryNode {
            id,
            prompt: row.get(1)?,
            response: row.get(2)?,
            summary: row.get(3)?,
            parent_id: row.get(4)?,
            depth: row.get(5)?,
            timestamp,
        })
    }
}
