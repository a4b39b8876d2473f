//! State handed to every HTTP handler
//!
//! Everything is behind `Arc`; cloning per request copies pointers only.

use std::sync::Arc;

use crate::config::Config;
use crate::context_engine::TreeOrchestrator;

#[derive(Clone)]
pub struct UnifiedAppState {
    pub orchestrator: Arc<TreeOrchestrator>,
    pub config: Arc<Config>,
}

impl UnifiedAppState {
    pub fn new(orchestrator: Arc<TreeOrchestrator>, config: Config) -> Self {
        Self {
            orchestrator,
            config: Arc::new(config),
        }
    }
}
