//! Memory database module - SQLite-based storage for the conversation forest
pub mod schema;
pub mod migration;
pub mod node_store;
pub use schema::*;
pub use migration::{MigrationManager, SchemaOutcome};
pub use node_store::NodeStore;
use std::path::Path;
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::TransactionBehavior;
use tracing::info;

use crate::error::TreeResult;

/// Pooled SQLite handle shared by every request.
pub struct MemoryDatabase {
    pub nodes: NodeStore,
    schema_outcome: SchemaOutcome,
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl MemoryDatabase {
    /// Open (or create) the database file and run the schema version check.
    ///
    /// With `allow_reset == false` a version mismatch is returned as
    /// [`crate::error::TreeError::SchemaMismatch`] and no data is touched.
    pub fn new(db_path: &Path, allow_reset: bool) -> anyhow::Result<Self> {
        info!("Opening memory database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
            )
            .with_init(|conn| conn.execute_batch(schema::PRAGMAS));
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        let schema_outcome = {
            let mut conn = pool.get()?;
            let mut migrator = MigrationManager::new(&mut conn);
            migrator.initialize_database(allow_reset)?
        };
        let pool = Arc::new(pool);
        info!("Memory database initialized successfully ({:?})", schema_outcome);
        Ok(Self {
            nodes: NodeStore::new(Arc::clone(&pool)),
            schema_outcome,
            pool,
        })
    }

    /// Private in-memory database.
    ///
    /// Each SQLite in-memory connection is its own database, so the pool is
    /// capped at one connection.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch(schema::PRAGMAS));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)?;
        let schema_outcome = {
            let mut conn = pool.get()?;
            MigrationManager::new(&mut conn).initialize_database(true)?
        };
        let pool = Arc::new(pool);
        Ok(Self {
            nodes: NodeStore::new(Arc::clone(&pool)),
            schema_outcome,
            pool,
        })
    }

    /// What the startup schema check did
    pub fn schema_outcome(&self) -> SchemaOutcome {
        self.schema_outcome
    }

    /// Run `f` inside one `BEGIN IMMEDIATE` transaction; commit on `Ok`,
    /// roll back on `Err`.
    pub fn with_transaction<T, F>(&self, f: F) -> TreeResult<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> TreeResult<T>,
    {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    pub fn get_stats(&self) -> TreeResult<DatabaseStats> {
        let conn = self.pool.get()?;
        migration::get_database_stats(&conn)
    }
}

impl std::fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDatabase")
            .field("schema_outcome", &self.schema_outcome)
            .field("pool", &self.pool.state())
            .finish_non_exhaustive()
    }
}

impl Drop for MemoryDatabase {
    fn drop(&mut self) {
        if let Ok(conn) = self.pool.get() {
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        }
    }
}
