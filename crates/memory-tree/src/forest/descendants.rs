//! Subtree collection for cascading deletes

use std::collections::{HashMap, HashSet};

use crate::memory_db::MemoryNode;

/// Ids of `target` and all of its transitive descendants, in pre-order.
///
/// Empty only when `target` is not among `nodes`; callers report that as
/// not found. Traversal uses an explicit stack, and a visited set keeps a
/// corrupt parent cycle from looping.
pub fn collect_subtree(nodes: &[MemoryNode], target: i64) -> Vec<i64> {
    if !nodes.iter().any(|n| n.id == target) {
        return Vec::new();
    }

    let mut children_of: HashMap<i64, Vec<i64>> = HashMap::new();
    for node in nodes {
        if let Some(pid) = node.parent_id {
            children_of.entry(pid).or_default().push(node.id);
        }
    }

    let mut collected = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![target];
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        collected.push(current);
        if let Some(children) = children_of.get(&current) {
            stack.extend(children.iter().rev().copied());
        }
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn node(id: i64, parent_id: Option<i64>) -> MemoryNode {
        MemoryNode {
            id,
            prompt: String::new(),
            response: String::new(),
            summary: None,
            parent_id,
            depth: 0,
            timestamp: Utc::now(),
        }
    }

    fn sample() -> Vec<MemoryNode> {
        // 1 ─┬─ 2 ── 4
        //    └─ 3
        // 5 ── 6
        vec![
            node(1, None),
            node(2, Some(1)),
            node(3, Some(1)),
            node(4, Some(2)),
            node(5, None),
            node(6, Some(5)),
        ]
    }

    #[test]
    fn test_leaf_returns_only_itself() {
        assert_eq!(collect_subtree(&sample(), 4), vec![4]);
    }

    #[test]
    fn test_root_with_two_children_and_grandchild() {
        let ids = collect_subtree(&sample(), 1);
        assert_eq!(ids, vec![1, 2, 4, 3]);
    }

    #[test]
    fn test_other_trees_untouched() {
        let ids: HashSet<i64> = collect_subtree(&sample(), 5).into_iter().collect();
        assert_eq!(ids, HashSet::from([5, 6]));
    }

    #[test]
    fn test_missing_target_is_empty() {
        assert!(collect_subtree(&sample(), 42).is_empty());
        assert!(collect_subtree(&[], 1).is_empty());
    }

    #[test]
    fn test_cycle_terminates() {
        let nodes = vec![node(1, Some(2)), node(2, Some(1))];
        let mut ids = collect_subtree(&nodes, 1);
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_wide_and_deep_inputs() {
        let mut nodes = vec![node(1, None)];
        for id in 2..=50_000 {
            nodes.push(node(id, Some(id - 1)));
        }
        for id in 50_001..=60_000 {
            nodes.push(node(id, Some(1)));
        }
        assert_eq!(collect_subtree(&nodes, 1).len(), 60_000);
    }

    proptest! {
        #[test]
        fn subtree_is_closed_under_children(
            parents in proptest::collection::vec(proptest::option::of(1i64..40), 1..40),
            pick in 0usize..40,
        ) {
            let nodes: Vec<MemoryNode> = parents
                .iter()
                .enumerate()
                .map(|(i, p)| node(i as i64 + 1, p.filter(|&p| p <= i as i64)))
                .collect();
            let target = (pick % nodes.len()) as i64 + 1;
            let ids: HashSet<i64> = collect_subtree(&nodes, target).into_iter().collect();

            prop_assert!(ids.contains(&target));
            for n in &nodes {
                if let Some(p) = n.parent_id {
                    if ids.contains(&p) {
                        prop_assert!(ids.contains(&n.id));
                    }
                }
            }
            // Everything collected walks back up to the target.
            let parent_of: HashMap<i64, Option<i64>> =
                nodes.iter().map(|n| (n.id, n.parent_id)).collect();
            for &id in &ids {
                let mut cur = Some(id);
                let mut reached = false;
                while let Some(c) = cur {
                    if c == target { reached = true; break; }
                    cur = parent_of.get(&c).copied().flatten();
                }
                prop_assert!(reached);
            }
        }
    }
}
