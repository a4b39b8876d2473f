//! Request-level control flow over the node store, the forest algorithms and
//! the text-generation collaborators

use std::sync::Arc;
use serde::Serialize;
use chrono::Utc;
use tracing::{info, debug};

use crate::context_engine::compression::{CompressionPolicy, ContextSource};
use crate::error::{TreeError, TreeResult};
use crate::forest::{build_forest, collect_subtree, TreeNode};
use crate::llm::{ResponseGenerator, Summarizer};
use crate::memory_db::{DatabaseStats, MemoryDatabase, MemoryNode, NewNode, NodeStore};

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Prompt of every seeded root.
    pub default_root_prompt: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_root_prompt: "Hi".to_string(),
        }
    }
}

/// Result of a create-node request
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub response: String,
    pub node_id: i64,
    pub parent_id: Option<i64>,
    pub depth: i64,
    /// How the parent's context was forwarded; `None` for roots.
    #[serde(skip)]
    pub context_source: Option<ContextSource>,
}

/// Result of a delete-all request
#[derive(Debug, Clone, Serialize)]
pub struct ClearOutcome {
    pub deleted: bool,
    pub new_root_created: bool,
    pub removed: usize,
    pub root_id: i64,
}

/// Result of a delete-subtree request
#[derive(Debug, Clone, Serialize)]
pub struct SubtreeDeletion {
    pub deleted_ids: Vec<i64>,
    /// Set when the deletion emptied the forest and a fresh root was seeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reseeded_root: Option<i64>,
}

pub struct TreeOrchestrator {
    database: Arc<MemoryDatabase>,
    generator: Arc<dyn ResponseGenerator>,
    summarizer: Arc<dyn Summarizer>,
    policy: CompressionPolicy,
    config: OrchestratorConfig,
}

impl TreeOrchestrator {
    pub fn new(
        database: Arc<MemoryDatabase>,
        generator: Arc<dyn ResponseGenerator>,
        summarizer: Arc<dyn Summarizer>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            database,
            generator,
            summarizer,
            policy: CompressionPolicy::default(),
            config,
        }
    }

    pub fn with_policy(mut self, policy: CompressionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.database
    }

    /// Seed the default root if the forest is empty.
    ///
    /// The generator runs before the write transaction; the transaction
    /// re-checks emptiness so two concurrent callers seed only once.
    pub async fn ensure_root(&self) -> TreeResult<Option<MemoryNode>> {
        if self.database.nodes.count()? > 0 {
            return Ok(None);
        }
        let prompt = self.config.default_root_prompt.as_str();
        let response = self.generator.generate(prompt).await;

        let seeded = self.database.with_transaction(|tx| {
            if NodeStore::count_with_conn(tx)? > 0 {
                return Ok(None);
            }
            NodeStore::insert_with_conn(tx, &NewNode::root(prompt, &response)).map(Some)
        })?;

        if let Some(ref root) = seeded {
            info!("Seeded default root node {}", root.id);
        }
        Ok(seeded)
    }

    /// Answer `message`, optionally as a child of `parent_id`, and record the
    /// new node.
    pub async fn create_node(&self, message: &str, parent_id: Option<i64>) -> TreeResult<ChatOutcome> {
        let parent = match parent_id {
            Some(id) => Some(
                self.database
                    .nodes
                    .get(id)?
                    .ok_or_else(|| TreeError::parent_not_found(id))?,
            ),
            None => None,
        };
        let depth = parent.as_ref().map_or(0, |p| p.depth + 1);

        let context = match parent {
            Some(ref p) => Some(
                self.policy
                    .select_context(p, self.summarizer.as_ref(), &self.database.nodes)
                    .await,
            ),
            None => None,
        };
        if let Some(ref selected) = context {
            debug!("Forwarding {:?} context for parent {:?}", selected.source, parent_id);
        }
        let prompt = CompressionPolicy::compose_prompt(context.as_ref().map(|c| c.text.as_str()), message);

        let response = self.generator.generate(&prompt).await;

        let node = self.database.nodes.insert(&NewNode {
            prompt: message,
            response: &response,
            parent_id,
            depth,
            timestamp: Utc::now(),
        })?;
        info!("Created node {} (parent {:?}, depth {})", node.id, node.parent_id, node.depth);

        Ok(ChatOutcome {
            response: node.response,
            node_id: node.id,
            parent_id: node.parent_id,
            depth: node.depth,
            context_source: context.map(|c| c.source),
        })
    }

    /// All nodes, flat, ordered by id
    pub fn list_nodes(&self) -> TreeResult<Vec<MemoryNode>> {
        self.database.nodes.list_all_ordered_by_id()
    }

    /// All nodes, nested
    pub fn get_forest(&self) -> TreeResult<Vec<TreeNode>> {
        let nodes = self.database.nodes.list_all_ordered_by_id()?;
        Ok(build_forest(nodes))
    }

    /// Remove every node and seed one fresh root, atomically.
    pub async fn delete_all(&self) -> TreeResult<ClearOutcome> {
        let prompt = self.config.default_root_prompt.as_str();
        let response = self.generator.generate(prompt).await;
        let (removed, root) = self.database.nodes.replace_forest_with_root(prompt, &response)?;
        Ok(ClearOutcome {
            deleted: true,
            new_root_created: true,
            removed,
            root_id: root.id,
        })
    }

    /// Delete `node_id` and all of its descendants.
    ///
    /// Collection and delete share one transaction. When the subtree is the
    /// whole forest the replacement root is inserted in that same
    /// transaction, so readers never see an empty forest; its response is
    /// generated beforehand, outside any lock.
    pub async fn delete_subtree(&self, node_id: i64) -> TreeResult<SubtreeDeletion> {
        let prompt = self.config.default_root_prompt.as_str();
        let mut root_response: Option<String> = None;

        loop {
            if root_response.is_none() {
                let nodes = self.database.nodes.list_all_ordered_by_id()?;
                let ids = collect_subtree(&nodes, node_id);
                if ids.is_empty() {
                    return Err(TreeError::node_not_found(node_id));
                }
                if ids.len() == nodes.len() {
                    root_response = Some(self.generator.generate(prompt).await);
                }
            }

            let attempt = self.database.with_transaction(|tx| {
                let nodes = NodeStore::list_all_with_conn(tx)?;
                let ids = collect_subtree(&nodes, node_id);
                if ids.is_empty() {
                    return Err(TreeError::node_not_found(node_id));
                }
                let empties_forest = ids.len() == nodes.len();
                let root = match (empties_forest, root_response.as_deref()) {
                    (false, _) => None,
                    (true, Some(response)) => Some(response),
                    // The forest shrank since the snapshot; roll back and
                    // generate a root first.
                    (true, None) => return Ok(None),
                };
                NodeStore::delete_many_with_conn(tx, &ids)?;
                let reseeded = match root {
                    Some(response) => Some(NodeStore::insert_with_conn(tx, &NewNode::root(prompt, response))?.id),
                    None => None,
                };
                Ok(Some(SubtreeDeletion { deleted_ids: ids, reseeded_root: reseeded }))
            })?;

            match attempt {
                Some(deletion) => {
                    info!("Deleted subtree of node {} ({} nodes)", node_id, deletion.deleted_ids.len());
                    if let Some(root_id) = deletion.reseeded_root {
                        info!("Forest emptied; seeded root node {}", root_id);
                    }
                    return Ok(deletion);
                }
                None => {
                    debug!("Subtree of node {} now spans the whole forest; generating a root", node_id);
                    root_response = Some(self.generator.generate(prompt).await);
                }
            }
        }
    }

    pub fn stats(&self) -> TreeResult<DatabaseStats> {
        self.database.get_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockLlm;
    use std::collections::{HashMap, HashSet};

    fn orchestrator_with(llm: Arc<MockLlm>) -> TreeOrchestrator {
        let db = Arc::new(MemoryDatabase::new_in_memory().unwrap());
        TreeOrchestrator::new(db, llm.clone(), llm, OrchestratorConfig::default())
    }

    fn orchestrator() -> (TreeOrchestrator, Arc<MockLlm>) {
        let llm = Arc::new(MockLlm::new());
        (orchestrator_with(llm.clone()), llm)
    }

    // ===== Create =====

    #[tokio::test]
    async fn test_root_then_child_scenario() {
        let (orch, _) = orchestrator();

        let root = orch.create_node("Hi", None).await.unwrap();
        assert_eq!(root.node_id, 1);
        assert_eq!(root.depth, 0);
        assert_eq!(root.parent_id, None);
        assert_eq!(root.response, "echo: Hi");

        let child = orch.create_node("Follow-up", Some(1)).await.unwrap();
        assert_eq!(child.node_id, 2);
        assert_eq!(child.depth, 1);
        assert_eq!(child.parent_id, Some(1));
        assert_eq!(child.context_source, Some(ContextSource::Raw));
        assert_eq!(root.context_source, None);
    }

    #[tokio::test]
    async fn test_child_prompt_carries_parent_context() {
        let (orch, llm) = orchestrator();
        orch.create_node("Hi", None).await.unwrap();
        orch.create_node("Follow-up", Some(1)).await.unwrap();

        let sent = llm.last_prompt().unwrap();
        assert_eq!(sent, "Previous context:\nQ: Hi\nA: echo: Hi\n\nNow, answer this:\nFollow-up");

        // The stored prompt is the user's message, not the composed one.
        let stored = orch.database().nodes.get(2).unwrap().unwrap();
        assert_eq!(stored.prompt, "Follow-up");
    }

    #[tokio::test]
    async fn test_unknown_parent_is_not_found_without_side_effects() {
        let (orch, llm) = orchestrator();
        let err = orch.create_node("Hello?", Some(77)).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(orch.database().nodes.count().unwrap(), 0);
        assert_eq!(llm.generate_count(), 0);
    }

    #[tokio::test]
    async fn test_depth_follows_parent_chain() {
        let (orch, _) = orchestrator();
        let mut parent = None;
        for i in 0..5 {
            let out = orch.create_node(&format!("m{}", i), parent).await.unwrap();
            assert_eq!(out.depth, i);
            parent = Some(out.node_id);
        }

        let nodes = orch.list_nodes().unwrap();
        let depth_of: HashMap<i64, i64> = nodes.iter().map(|n| (n.id, n.depth)).collect();
        for n in &nodes {
            match n.parent_id {
                Some(p) => assert_eq!(n.depth, depth_of[&p] + 1),
                None => assert_eq!(n.depth, 0),
            }
        }
    }

    #[tokio::test]
    async fn test_siblings_share_one_summary() {
        let llm = Arc::new(MockLlm::with_summary("short summary"));
        let orch = orchestrator_with(llm.clone());
        let long = "x".repeat(300);
        let parent = orch.create_node(&long, None).await.unwrap();

        orch.create_node("first sibling", Some(parent.node_id)).await.unwrap();
        assert_eq!(llm.summarize_count(), 1);
        assert!(llm.last_prompt().unwrap().contains("short summary"));

        orch.create_node("second sibling", Some(parent.node_id)).await.unwrap();
        assert_eq!(llm.summarize_count(), 1);

        let cached = orch.database().nodes.get(parent.node_id).unwrap().unwrap();
        assert_eq!(cached.summary.as_deref(), Some("short summary"));
    }

    // ===== Read =====

    #[tokio::test]
    async fn test_forest_matches_flat_list() {
        let (orch, _) = orchestrator();
        orch.create_node("a", None).await.unwrap();
        orch.create_node("b", Some(1)).await.unwrap();
        orch.create_node("c", None).await.unwrap();

        let forest = orch.get_forest().unwrap();
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].children[0].node.prompt, "b");
        let total: usize = forest.iter().map(|t| t.size()).sum();
        assert_eq!(total, orch.list_nodes().unwrap().len());
    }

    // ===== Delete =====

    #[tokio::test]
    async fn test_delete_subtree_scenario() {
        let (orch, _) = orchestrator();
        let target = orch.create_node("target", None).await.unwrap().node_id;
        let keep = orch.create_node("other root", None).await.unwrap().node_id;
        let c1 = orch.create_node("c1", Some(target)).await.unwrap().node_id;
        let c2 = orch.create_node("c2", Some(target)).await.unwrap().node_id;
        let g1 = orch.create_node("g1", Some(c1)).await.unwrap().node_id;

        let result = orch.delete_subtree(target).await.unwrap();
        let deleted: HashSet<i64> = result.deleted_ids.into_iter().collect();
        assert_eq!(deleted, HashSet::from([target, c1, c2, g1]));
        assert_eq!(result.reseeded_root, None);

        let remaining: Vec<i64> = orch.list_nodes().unwrap().iter().map(|n| n.id).collect();
        assert_eq!(remaining, vec![keep]);
    }

    #[tokio::test]
    async fn test_delete_missing_subtree_is_not_found() {
        let (orch, _) = orchestrator();
        orch.create_node("a", None).await.unwrap();
        let err = orch.delete_subtree(404).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(orch.database().nodes.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_deleting_last_tree_reseeds_root() {
        let (orch, _) = orchestrator();
        let only = orch.create_node("only", None).await.unwrap().node_id;
        let result = orch.delete_subtree(only).await.unwrap();
        assert_eq!(result.deleted_ids, vec![only]);

        let nodes = orch.list_nodes().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(Some(nodes[0].id), result.reseeded_root);
        assert_eq!(nodes[0].prompt, "Hi");
    }

    /// Records how many nodes a reader sees while a response is generated.
    struct ObservingGenerator {
        database: Arc<MemoryDatabase>,
        observed: std::sync::Mutex<Vec<i64>>,
    }

    #[async_trait::async_trait]
    impl ResponseGenerator for ObservingGenerator {
        async fn generate(&self, prompt: &str) -> String {
            let count = self.database.nodes.count().unwrap();
            self.observed.lock().unwrap().push(count);
            format!("seen: {}", prompt)
        }
    }

    #[tokio::test]
    async fn test_forest_never_empty_while_root_is_generated() {
        let db = Arc::new(MemoryDatabase::new_in_memory().unwrap());
        let generator = Arc::new(ObservingGenerator {
            database: Arc::clone(&db),
            observed: std::sync::Mutex::new(Vec::new()),
        });
        let orch = TreeOrchestrator::new(
            Arc::clone(&db),
            generator.clone(),
            Arc::new(MockLlm::new()),
            OrchestratorConfig::default(),
        );
        let only = orch.create_node("only", None).await.unwrap().node_id;
        orch.create_node("child", Some(only)).await.unwrap();
        generator.observed.lock().unwrap().clear();

        let result = orch.delete_subtree(only).await.unwrap();
        assert_eq!(result.deleted_ids.len(), 2);

        let observed = generator.observed.lock().unwrap().clone();
        assert_eq!(observed, vec![2]);
        let nodes = orch.list_nodes().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].response, "seen: Hi");
        assert_eq!(Some(nodes[0].id), result.reseeded_root);
    }

    #[tokio::test]
    async fn test_partial_subtree_delete_skips_generator() {
        let (orch, llm) = orchestrator();
        let keep = orch.create_node("keep", None).await.unwrap().node_id;
        let gone = orch.create_node("gone", None).await.unwrap().node_id;
        let calls = llm.generate_count();

        let result = orch.delete_subtree(gone).await.unwrap();
        assert_eq!(result.deleted_ids, vec![gone]);
        assert_eq!(result.reseeded_root, None);
        assert_eq!(llm.generate_count(), calls);
        let remaining: Vec<i64> = orch.list_nodes().unwrap().iter().map(|n| n.id).collect();
        assert_eq!(remaining, vec![keep]);
    }

    #[tokio::test]
    async fn test_delete_all_scenario() {
        let (orch, _) = orchestrator();
        let mut parent = None;
        for i in 0..10 {
            let id = orch.create_node(&format!("n{}", i), parent).await.unwrap().node_id;
            parent = if i % 3 == 0 { None } else { Some(id) };
        }
        assert_eq!(orch.database().nodes.count().unwrap(), 10);

        let outcome = orch.delete_all().await.unwrap();
        assert!(outcome.deleted && outcome.new_root_created);
        assert_eq!(outcome.removed, 10);

        assert_eq!(orch.database().nodes.count().unwrap(), 1);
        let root = orch.database().nodes.get(outcome.root_id).unwrap().unwrap();
        assert!(root.is_root());
        assert_eq!(root.depth, 0);
        assert!(root.id > 10);
    }

    // ===== Seeding =====

    #[tokio::test]
    async fn test_ensure_root_seeds_only_when_empty() {
        let (orch, llm) = orchestrator();
        let seeded = orch.ensure_root().await.unwrap().unwrap();
        assert_eq!(seeded.prompt, "Hi");
        assert_eq!(seeded.response, "echo: Hi");

        assert!(orch.ensure_root().await.unwrap().is_none());
        assert_eq!(orch.database().nodes.count().unwrap(), 1);
        assert_eq!(llm.generate_count(), 1);
    }

    #[test]
    fn test_ensure_root_from_sync_context() {
        let (orch, _) = orchestrator();
        let seeded = tokio_test::block_on(orch.ensure_root()).unwrap();
        assert!(seeded.is_some());
    }
}
