//! Structural validation, run before a definition is activated.
//!
//! Checks, in order, accumulating every failure:
//! 1. The name is not blank.
//! 2. There is at least one node (otherwise stop).
//! 3. There is exactly one start node.
//! 4. There is at least one end node.
//! 5. Node ids are unique.
//! 6. Every successor reference names an existing node.
//! 7. An end node is reachable from the start node.
//! 8. Per-node shape: approvers present, notifications use messaging
//!    actions, delay durations parse, nothing routes back into start.
//!
//! A view that does not carry its nodes (a list-view summary) is always
//! valid: there is nothing structural to check.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::dag::reachable_from;
use crate::duration::parse_duration;
use crate::models::{Node, NodeKind, WorkflowView};

/// Outcome of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self { valid: errors.is_empty(), errors }
    }
}

/// Validate a workflow's structure. Never fails; problems are reported.
pub fn validate<V: WorkflowView + ?Sized>(workflow: &V) -> ValidationReport {
    let Some(nodes) = workflow.graph() else {
        return ValidationReport::from_errors(Vec::new());
    };

    let mut errors = Vec::new();

    if workflow.display_name().trim().is_empty() {
        errors.push("Name is required".to_owned());
    }

    if nodes.is_empty() {
        errors.push("Workflow must have at least one node".to_owned());
        return ValidationReport::from_errors(errors);
    }

    let starts: Vec<&Node> = nodes.iter().filter(|n| n.is_start()).collect();
    match starts.len() {
        0 => errors.push("Start node is missing".to_owned()),
        1 => {}
        n => errors.push(format!("Workflow has {n} start nodes; exactly one is required")),
    }

    let has_end = nodes.iter().any(Node::is_end);
    if !has_end {
        errors.push("End node is missing".to_owned());
    }

    let mut ids: HashSet<&str> = HashSet::with_capacity(nodes.len());
    let mut reported: HashSet<&str> = HashSet::new();
    for node in nodes {
        if !ids.insert(node.id.as_str()) && reported.insert(node.id.as_str()) {
            errors.push(format!("Duplicate node id {}", node.id));
        }
    }

    for node in nodes {
        if node.successors().iter().any(|next| !ids.contains(next)) {
            errors.push(format!("Dangling reference from node {}", node.id));
        }
    }

    if let ([start], true) = (starts.as_slice(), has_end) {
        let reached = reachable_from(nodes, &start.id);
        if !nodes.iter().any(|n| n.is_end() && reached.contains(n.id.as_str())) {
            errors.push("End node is unreachable".to_owned());
        }
    }

    let start_ids: HashSet<&str> = starts.iter().map(|n| n.id.as_str()).collect();
    for node in nodes {
        match &node.kind {
            NodeKind::Approval { approvers, .. } if approvers.iter().all(|a| a.trim().is_empty()) => {
                errors.push(format!("Approval node {} has no approvers", node.id));
            }
            NodeKind::Notification { action, .. } if !action.action_type.is_messaging() => {
                errors.push(format!("Notification node {} must use a messaging action", node.id));
            }
            NodeKind::Delay { config, .. } if parse_duration(&config.duration).is_err() => {
                errors.push(format!(
                    "Delay node {} has an invalid duration '{}'",
                    node.id, config.duration
                ));
            }
            _ => {}
        }
        if node.successors().iter().any(|next| start_ids.contains(next)) {
            errors.push(format!("Node {} routes back into the start node", node.id));
        }
    }

    ValidationReport::from_errors(errors)
}
