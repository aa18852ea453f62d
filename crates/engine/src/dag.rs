//! Graph helpers over a definition's node list.
//!
//! Edges are the successor fields of each node (`next`, `trueNext`,
//! `falseNext`). Cycles are allowed: a condition may route back to an
//! earlier node. Edges pointing at unknown ids are ignored here; the
//! validator reports them separately.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::models::Node;

/// Map node id → node. On duplicate ids the first declaration wins.
pub fn index_nodes(nodes: &[Node]) -> HashMap<&str, &Node> {
    let mut index = HashMap::with_capacity(nodes.len());
    for node in nodes {
        index.entry(node.id.as_str()).or_insert(node);
    }
    index
}

/// Every node id reachable from `from` (inclusive) by following successor edges.
pub fn reachable_from<'a>(nodes: &'a [Node], from: &'a str) -> HashSet<&'a str> {
    let index = index_nodes(nodes);
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    if index.contains_key(from) {
        visited.insert(from);
        queue.push_back(from);
    }

    while let Some(node_id) = queue.pop_front() {
        let Some(node) = index.get(node_id) else { continue };
        for next in node.successors() {
            if index.contains_key(next) && visited.insert(next) {
                queue.push_back(next);
            }
        }
    }

    visited
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConditionOperator;
    use serde_json::json;

    #[test]
    fn follows_both_condition_branches() {
        //   s
        //   |
        //   c
        //  / \
        // a   e
        let nodes = vec![
            Node::start("s", "c"),
            Node::condition("c", "age", ConditionOperator::GreaterThan, json!(18), "a", "e"),
            Node::approval("a", ["underwriter"], "e"),
            Node::end("e"),
        ];

        let reached = reachable_from(&nodes, "s");
        assert_eq!(reached.len(), 4);
    }

    #[test]
    fn cycles_terminate() {
        let nodes = vec![
            Node::start("s", "c"),
            Node::condition("c", "n", ConditionOperator::LessThan, json!(3), "s", "e"),
            Node::end("e"),
        ];
        let reached = reachable_from(&nodes, "s");
        assert!(reached.contains("e"));
    }

    #[test]
    fn unknown_targets_and_islands_are_not_reached() {
        let nodes = vec![
            Node::start("s", "ghost"),
            Node::end("island"),
        ];
        let reached = reachable_from(&nodes, "s");
        assert_eq!(reached, HashSet::from(["s"]));
    }

    #[test]
    fn first_duplicate_wins_in_index() {
        let nodes = vec![Node::start("x", "e"), Node::end("x")];
        assert!(index_nodes(&nodes)["x"].is_start());
    }
}
