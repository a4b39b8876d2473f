//! Context engine module - parent context selection and forest request flow

pub mod compression;
pub mod orchestrator;

pub use compression::{CompressionPolicy, ContextSource, SelectedContext, CONTEXT_THRESHOLD_CHARS};
pub use orchestrator::{ChatOutcome, ClearOutcome, OrchestratorConfig, SubtreeDeletion, TreeOrchestrator};

use std::sync::Arc;

use crate::llm::{ResponseGenerator, Summarizer};
use crate::memory_db::MemoryDatabase;

/// Orchestrator with the default compression policy and root prompt
pub fn create_default_orchestrator(
    database: Arc<MemoryDatabase>,
    generator: Arc<dyn ResponseGenerator>,
    summarizer: Arc<dyn Summarizer>,
) -> TreeOrchestrator {
    TreeOrchestrator::new(database, generator, summarizer, OrchestratorConfig::default())
}
