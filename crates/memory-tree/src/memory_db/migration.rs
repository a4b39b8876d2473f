//! Schema version check and destructive reset

use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::{info, warn, error};

use crate::error::{TreeError, TreeResult};
use crate::memory_db::schema;

/// What the startup schema check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOutcome {
    /// No version record existed; tables were created.
    Created,
    /// Stored version matched the compiled-in one.
    Unchanged,
    /// Stored version differed; every table was dropped and recreated.
    Reset { from: i64 },
}

/// Manages the schema version marker
pub struct MigrationManager<'a> {
    conn: &'a mut Connection,
}

impl<'a> MigrationManager<'a> {
    pub fn new(conn: &'a mut Connection) -> Self {
        Self { conn }
    }

    /// Compare the stored version with [`schema::SCHEMA_VERSION`] and create or
    /// reset the tables accordingly.
    ///
    /// Runs in a single `BEGIN IMMEDIATE` transaction: concurrent readers see
    /// either the old tables with their data or the new empty ones.
    pub fn initialize_database(&mut self, allow_reset: bool) -> TreeResult<SchemaOutcome> {
        info!("Initializing memory tree schema...");

        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute_batch(schema::VERSION_TABLE_SQL)?;

        let stored: Option<i64> = tx
            .query_row(
                "SELECT version FROM _schema_version ORDER BY id LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match stored {
            None => {
                tx.execute_batch(schema::SCHEMA_SQL)?;
                tx.execute(
                    "INSERT INTO _schema_version (id, version) VALUES (1, ?1)",
                    [schema::SCHEMA_VERSION],
                )?;
                SchemaOutcome::Created
            }
            Some(version) if version == schema::SCHEMA_VERSION => {
                // Tables may have been dropped by hand; recreating is a no-op otherwise.
                tx.execute_batch(schema::SCHEMA_SQL)?;
                SchemaOutcome::Unchanged
            }
            Some(version) => {
                if !allow_reset {
                    error!(
                        "Database schema version mismatch (found {}, expected {}) and destructive reset is disabled",
                        version,
                        schema::SCHEMA_VERSION
                    );
                    // Dropping `tx` rolls back; nothing was changed.
                    return Err(TreeError::SchemaMismatch {
                        found: version,
                        expected: schema::SCHEMA_VERSION,
                    });
                }

                let discarded: i64 = tx
                    .query_row("SELECT COUNT(*) FROM memory_nodes", [], |row| row.get(0))
                    .unwrap_or(0);
                warn!(
                    "Schema version {} differs from {}: dropping all tables ({} nodes discarded)",
                    version,
                    schema::SCHEMA_VERSION,
                    discarded
                );

                tx.execute_batch(schema::DROP_SQL)?;
                tx.execute_batch(schema::SCHEMA_SQL)?;
                tx.execute("DELETE FROM _schema_version", [])?;
                tx.execute(
                    "INSERT INTO _schema_version (id, version) VALUES (1, ?1)",
                    [schema::SCHEMA_VERSION],
                )?;
                SchemaOutcome::Reset { from: version }
            }
        };

        tx.commit()?;
        info!("Schema check finished: {:?}", outcome);
        Ok(outcome)
    }

    /// Get the stored schema version, if any
    pub fn get_current_version(&self) -> TreeResult<Option<i64>> {
        let version = self
            .conn
            .query_row(
                "SELECT version FROM _schema_version ORDER BY id LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }
}

/// Get database statistics from a connection
pub fn get_database_stats(conn: &Connection) -> TreeResult<schema::DatabaseStats> {
    let (total_nodes, root_nodes, summarized_nodes, max_depth): (i64, i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN parent_id IS NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN summary IS NOT NULL AND TRIM(summary) != '' THEN 1 ELSE 0 END), 0),
                COALESCE(MAX(depth), 0)
         FROM memory_nodes",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
    )?;

    let database_size_bytes: i64 = conn
        .query_row(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let schema_version: i64 = conn
        .query_row("SELECT version FROM _schema_version ORDER BY id LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(schema::DatabaseStats {
        total_nodes,
        root_nodes,
        summarized_nodes,
        max_depth,
        database_size_bytes,
        schema_version,
    })
}
