//! Rebuilds the nested forest from the flat node table

use std::collections::HashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::memory_db::MemoryNode;

/// A node together with its children, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub node: MemoryNode,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Number of nodes in this subtree, itself included.
    pub fn size(&self) -> usize {
        let mut total = 0;
        let mut stack = vec![self];
        while let Some(current) = stack.pop() {
            total += 1;
            stack.extend(current.children.iter());
        }
        total
    }
}

/// Assemble an ordered forest from a flat, ordered node sequence.
///
/// A node whose `parent_id` is absent from `nodes` becomes a root instead of
/// being dropped. Children keep the relative order of the input. Nodes caught
/// in a parent cycle (never reachable from a root) are surfaced as roots at
/// their first position so every id still appears exactly once.
///
/// Runs in O(n) with an explicit stack; deep chains do not recurse.
pub fn build_forest(nodes: Vec<MemoryNode>) -> Vec<TreeNode> {
    let mut index_of: HashMap<i64, usize> = HashMap::with_capacity(nodes.len());
    let mut unique: Vec<MemoryNode> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if index_of.contains_key(&node.id) {
            warn!("Duplicate node id {} in forest input; keeping the first", node.id);
            continue;
        }
        index_of.insert(node.id, unique.len());
        unique.push(node);
    }

    let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); unique.len()];
    let mut root_slots: Vec<usize> = Vec::new();
    for (idx, node) in unique.iter().enumerate() {
        match node.parent_id.and_then(|pid| index_of.get(&pid).copied()) {
            Some(parent_idx) if parent_idx != idx => children_of[parent_idx].push(idx),
            _ => {
                if node.parent_id.is_some() {
                    debug!("Node {} has dangling parent {:?}; treating as root", node.id, node.parent_id);
                }
                root_slots.push(idx);
            }
        }
    }

    // Anything unreachable from a root sits on a cycle; promote the first
    // member of each such component.
    let mut reachable = vec![false; unique.len()];
    let mut stack: Vec<usize> = root_slots.clone();
    while let Some(idx) = stack.pop() {
        if reachable[idx] {
            continue;
        }
        reachable[idx] = true;
        stack.extend(children_of[idx].iter().copied());
    }
    for idx in 0..unique.len() {
        if reachable[idx] {
            continue;
        }
        warn!("Node {} is part of a parent cycle; treating as root", unique[idx].id);
        root_slots.push(idx);
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            if reachable[current] {
                continue;
            }
            reachable[current] = true;
            stack.extend(children_of[current].iter().copied());
        }
    }
    root_slots.sort_unstable();

    let mut slots: Vec<Option<MemoryNode>> = unique.into_iter().map(Some).collect();
    let mut built: Vec<Option<TreeNode>> = (0..slots.len()).map(|_| None).collect();
    let mut placed = vec![false; slots.len()];

    // Iterative post-order: a node is built once all its children are.
    let mut forest = Vec::with_capacity(root_slots.len());
    for &root in &root_slots {
        let mut stack: Vec<(usize, bool)> = vec![(root, false)];
        placed[root] = true;
        while let Some((idx, expanded)) = stack.pop() {
            if !expanded {
                stack.push((idx, true));
                for &child in children_of[idx].iter().rev() {
                    if !placed[child] {
                        placed[child] = true;
                        stack.push((child, false));
                    }
                }
                continue;
            }
            let children: Vec<TreeNode> = children_of[idx]
                .iter()
                .filter_map(|&child| built[child].take())
                .collect();
            if let Some(node) = slots[idx].take() {
                built[idx] = Some(TreeNode { node, children });
            }
        }
        if let Some(tree) = built[root].take() {
            forest.push(tree);
        }
    }

    forest
}
