// memory-tree/crates/memory-tree/src/lib.rs

pub mod config;
pub mod context_engine;
pub mod error;
pub mod forest;
pub mod llm;
pub mod memory_db;
pub mod telemetry;
pub mod utils;

#[cfg(feature = "cli")]
pub mod api;
#[cfg(feature = "cli")]
pub mod metrics;
#[cfg(feature = "cli")]
pub mod server;
#[cfg(feature = "cli")]
pub mod shared_state;

// Public API exports
pub use config::Config;
pub use context_engine::{create_default_orchestrator, CompressionPolicy, TreeOrchestrator};
pub use error::{TreeError, TreeResult};
pub use forest::{build_forest, collect_subtree, TreeNode};
pub use llm::{LlmClient, ResponseGenerator, Summarizer};
pub use memory_db::{MemoryDatabase, MemoryNode, NewNode, NodeStore, SchemaOutcome};

#[cfg(feature = "cli")]
pub use server::run_server;
