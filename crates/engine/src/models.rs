//! Core domain models for workflow definitions.
//!
//! A definition is a declarative node graph plus a trigger. Nodes are a
//! closed sum type; on the wire they are flat JSON objects tagged by `type`,
//! which is matched case-insensitively.

use chrono::{DateTime, Utc};
use effects::ActionType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::EngineError;

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// What starts an execution of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    OnCreate,
    OnUpdate,
    OnStatusChange,
    Scheduled,
    Webhook,
}

// ---------------------------------------------------------------------------
// DefinitionStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionStatus {
    #[default]
    Draft,
    Active,
    Paused,
    Completed,
    Failed,
}

impl std::fmt::Display for DefinitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Node payloads
// ---------------------------------------------------------------------------

/// The side effect an action or notification node requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Values may contain `{{path.to.field}}` placeholders.
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ActionDescriptor {
    pub fn new(action_type: ActionType, params: Map<String, Value>) -> Self {
        Self { action_type, params }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    IsEmpty,
    IsNotEmpty,
}

/// `context[field] <operator> value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayConfig {
    /// Compact (`"7d"`, `"1h30m"`) or ISO-8601 (`"P7D"`) duration.
    pub duration: String,
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single step in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct Node {
    /// Unique within the owning definition.
    pub id: String,
    pub label: Option<String>,
    pub kind: NodeKind,
}

/// The variant-specific part of a node, including its outgoing edges.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Start { next: String },
    Action { action: ActionDescriptor, next: String },
    Condition { condition: Condition, true_next: String, false_next: String },
    Approval { approvers: Vec<String>, next: String },
    Notification { action: ActionDescriptor, next: String },
    Delay { config: DelayConfig, next: String },
    End,
}

impl Node {
    fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self { id: id.into(), label: None, kind }
    }

    pub fn start(id: impl Into<String>, next: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Start { next: next.into() })
    }

    pub fn action(
        id: impl Into<String>,
        action_type: ActionType,
        params: Map<String, Value>,
        next: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            NodeKind::Action {
                action: ActionDescriptor::new(action_type, params),
                next: next.into(),
            },
        )
    }

    pub fn condition(
        id: impl Into<String>,
        field: impl Into<String>,
        operator: ConditionOperator,
        value: Value,
        true_next: impl Into<String>,
        false_next: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            NodeKind::Condition {
                condition: Condition { field: field.into(), operator, value },
                true_next: true_next.into(),
                false_next: false_next.into(),
            },
        )
    }

    pub fn approval<I, S>(id: impl Into<String>, approvers: I, next: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            id,
            NodeKind::Approval {
                approvers: approvers.into_iter().map(Into::into).collect(),
                next: next.into(),
            },
        )
    }

    pub fn notification(
        id: impl Into<String>,
        action_type: ActionType,
        params: Map<String, Value>,
        next: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            NodeKind::Notification {
                action: ActionDescriptor::new(action_type, params),
                next: next.into(),
            },
        )
    }

    pub fn delay(id: impl Into<String>, duration: impl Into<String>, next: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::Delay {
                config: DelayConfig { duration: duration.into() },
                next: next.into(),
            },
        )
    }

    pub fn end(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::End)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The wire name of this node's type.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            NodeKind::Start { .. } => "start",
            NodeKind::Action { .. } => "action",
            NodeKind::Condition { .. } => "condition",
            NodeKind::Approval { .. } => "approval",
            NodeKind::Notification { .. } => "notification",
            NodeKind::Delay { .. } => "delay",
            NodeKind::End => "end",
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(self.kind, NodeKind::Start { .. })
    }

    pub fn is_end(&self) -> bool {
        matches!(self.kind, NodeKind::End)
    }

    /// Every outgoing edge, in declaration order.
    pub fn successors(&self) -> Vec<&str> {
        match &self.kind {
            NodeKind::Start { next }
            | NodeKind::Action { next, .. }
            | NodeKind::Approval { next, .. }
            | NodeKind::Notification { next, .. }
            | NodeKind::Delay { next, .. } => vec![next.as_str()],
            NodeKind::Condition { true_next, false_next, .. } => {
                vec![true_next.as_str(), false_next.as_str()]
            }
            NodeKind::End => Vec::new(),
        }
    }
}

/// Flat wire shape of a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    id: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    true_next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    false_next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<ActionDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    approvers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    config: Option<DelayConfig>,
}

impl TryFrom<RawNode> for Node {
    type Error = EngineError;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let id = raw.id;
        let missing = |field: &str| EngineError::MalformedNode {
            node_id: id.clone(),
            reason: format!("'{}' node requires '{field}'", raw.node_type),
        };

        let kind = match raw.node_type.to_ascii_lowercase().as_str() {
            "start" => NodeKind::Start {
                next: raw.next.ok_or_else(|| missing("next"))?,
            },
            "action" => NodeKind::Action {
                action: raw.action.ok_or_else(|| missing("action"))?,
                next: raw.next.ok_or_else(|| missing("next"))?,
            },
            "condition" => NodeKind::Condition {
                condition: raw.condition.ok_or_else(|| missing("condition"))?,
                true_next: raw.true_next.ok_or_else(|| missing("trueNext"))?,
                false_next: raw.false_next.ok_or_else(|| missing("falseNext"))?,
            },
            "approval" => NodeKind::Approval {
                approvers: raw.approvers.ok_or_else(|| missing("approvers"))?,
                next: raw.next.ok_or_else(|| missing("next"))?,
            },
            "notification" => NodeKind::Notification {
                action: raw.action.ok_or_else(|| missing("action"))?,
                next: raw.next.ok_or_else(|| missing("next"))?,
            },
            "delay" => NodeKind::Delay {
                config: raw.config.ok_or_else(|| missing("config"))?,
                next: raw.next.ok_or_else(|| missing("next"))?,
            },
            "end" => NodeKind::End,
            other => {
                return Err(EngineError::MalformedNode {
                    node_id: id.clone(),
                    reason: format!("unknown node type '{other}'"),
                })
            }
        };

        Ok(Node { id, label: raw.label, kind })
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        let mut raw = RawNode {
            node_type: node.type_name().to_owned(),
            id: node.id,
            label: node.label,
            ..RawNode::default()
        };
        match node.kind {
            NodeKind::Start { next } => raw.next = Some(next),
            NodeKind::Action { action, next } | NodeKind::Notification { action, next } => {
                raw.action = Some(action);
                raw.next = Some(next);
            }
            NodeKind::Condition { condition, true_next, false_next } => {
                raw.condition = Some(condition);
                raw.true_next = Some(true_next);
                raw.false_next = Some(false_next);
            }
            NodeKind::Approval { approvers, next } => {
                raw.approvers = Some(approvers);
                raw.next = Some(next);
            }
            NodeKind::Delay { config, next } => {
                raw.config = Some(config);
                raw.next = Some(next);
            }
            NodeKind::End => {}
        }
        raw
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// A complete workflow definition.
///
/// Fields are read-only from outside the crate. The graph can only be edited
/// while the definition is a draft; see [`WorkflowDefinition::new_version`]
/// for changing a live workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    id: Uuid,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    trigger: Trigger,
    nodes: Vec<Node>,
    /// Never read from the wire: a decoded definition is a draft until
    /// [`WorkflowDefinition::activate`] has validated it.
    #[serde(skip_deserializing)]
    status: DefinitionStatus,
    #[serde(default = "first_version")]
    version: u32,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

fn first_version() -> u32 {
    1
}

impl WorkflowDefinition {
    /// Create a new draft definition.
    ///
    /// # Errors
    /// [`EngineError::Validation`] if `name` is blank.
    pub fn create(
        name: impl Into<String>,
        trigger: Trigger,
        nodes: Vec<Node>,
    ) -> Result<Self, EngineError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EngineError::Validation {
                errors: vec!["Name is required".to_owned()],
            });
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            description: None,
            trigger,
            nodes,
            status: DefinitionStatus::Draft,
            version: first_version(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn status(&self) -> DefinitionStatus {
        self.status
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Append a node to a draft definition.
    ///
    /// # Errors
    /// [`EngineError::InvalidState`] unless the definition is a draft.
    pub fn add_step(&mut self, step: Node) -> Result<(), EngineError> {
        self.ensure_draft("add a step to")?;
        self.nodes.push(step);
        self.touch();
        Ok(())
    }

    pub fn set_trigger(&mut self, trigger: Trigger) -> Result<(), EngineError> {
        self.ensure_draft("change the trigger of")?;
        self.trigger = trigger;
        self.touch();
        Ok(())
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> Result<(), EngineError> {
        self.ensure_draft("describe")?;
        self.description = Some(description.into());
        self.touch();
        Ok(())
    }

    /// Copy this definition into a fresh draft with the next version number.
    ///
    /// This is the only way to change the graph of a workflow that has left
    /// `draft`; the original stays untouched.
    pub fn new_version(&self) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: DefinitionStatus::Draft,
            version: self.version + 1,
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }

    /// List-view projection without the node graph.
    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            trigger: self.trigger,
            status: self.status,
            version: self.version,
            node_count: self.nodes.len(),
        }
    }

    pub(crate) fn set_status(&mut self, status: DefinitionStatus) {
        self.status = status;
        self.touch();
    }

    fn ensure_draft(&self, operation: &'static str) -> Result<(), EngineError> {
        if self.status != DefinitionStatus::Draft {
            return Err(EngineError::invalid_state("workflow", self.id, self.status, operation));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// WorkflowSummary
// ---------------------------------------------------------------------------

/// A definition as it appears in list views: everything but the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub trigger: Trigger,
    pub status: DefinitionStatus,
    pub version: u32,
    #[serde(default)]
    pub node_count: usize,
}

/// Anything the validator can look at.
///
/// `graph` returns `None` for projections that do not carry the nodes.
pub trait WorkflowView {
    fn display_name(&self) -> &str;
    fn graph(&self) -> Option<&[Node]>;
}

impl WorkflowView for WorkflowDefinition {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn graph(&self) -> Option<&[Node]> {
        Some(&self.nodes)
    }
}

impl WorkflowView for WorkflowSummary {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn graph(&self) -> Option<&[Node]> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_type_tag_is_case_insensitive() {
        let start: Node = serde_json::from_value(json!({ "id": "s", "type": "Start", "next": "e" })).unwrap();
        let end: Node = serde_json::from_value(json!({ "id": "e", "type": "END" })).unwrap();

        assert!(start.is_start());
        assert!(end.is_end());
    }

    #[test]
    fn condition_node_uses_camel_case_branches() {
        let node: Node = serde_json::from_value(json!({
            "id": "c",
            "type": "condition",
            "condition": { "field": "age", "operator": "greater_than", "value": 18 },
            "trueNext": "yes",
            "falseNext": "no"
        }))
        .unwrap();

        assert_eq!(node.successors(), vec!["yes", "no"]);
        let back = serde_json::to_value(&node).unwrap();
        assert_eq!(back["trueNext"], "yes");
        assert_eq!(back["type"], "condition");
        assert!(back.get("next").is_none());
    }

    #[test]
    fn missing_successor_is_a_decode_error() {
        let err = serde_json::from_value::<Node>(json!({ "id": "a", "type": "action",
            "action": { "type": "send_email", "params": {} } }))
        .unwrap_err();
        assert!(err.to_string().contains("requires 'next'"));
    }

    #[test]
    fn unknown_node_type_is_rejected() {
        let err = serde_json::from_value::<Node>(json!({ "id": "x", "type": "loop", "next": "y" })).unwrap_err();
        assert!(err.to_string().contains("unknown node type 'loop'"));
    }

    #[test]
    fn create_rejects_blank_name() {
        let err = WorkflowDefinition::create("  ", Trigger::Manual, vec![]).unwrap_err();
        assert!(matches!(err, EngineError::Validation { errors } if errors == ["Name is required"]));
    }

    #[test]
    fn add_step_only_on_drafts() {
        let mut wf = WorkflowDefinition::create("renewal", Trigger::OnCreate, vec![]).unwrap();
        wf.add_step(Node::start("s", "e")).unwrap();
        wf.add_step(Node::end("e")).unwrap();
        assert_eq!(wf.nodes().len(), 2);

        wf.set_status(DefinitionStatus::Active);
        let err = wf.add_step(Node::end("late")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { operation: "add a step to", .. }));
        assert!(wf.set_trigger(Trigger::Webhook).is_err());
        assert_eq!(wf.nodes().len(), 2);
        assert_eq!(wf.trigger(), Trigger::OnCreate);
    }

    #[test]
    fn new_version_is_an_independent_draft() {
        let mut wf = WorkflowDefinition::create("renewal", Trigger::Manual, vec![Node::end("e")]).unwrap();
        wf.set_status(DefinitionStatus::Active);

        let mut next = wf.new_version();
        assert_ne!(next.id(), wf.id());
        assert_eq!(next.version(), 2);
        assert_eq!(next.status(), DefinitionStatus::Draft);

        next.add_step(Node::end("e2")).unwrap();
        assert_eq!(wf.nodes().len(), 1);
    }

    #[test]
    fn definition_decodes_with_defaults() {
        let wf: WorkflowDefinition = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "name": "Quote follow-up",
            "trigger": "on_status_change",
            "nodes": [
                { "id": "s", "type": "start", "next": "e" },
                { "id": "e", "type": "end" }
            ]
        }))
        .unwrap();

        assert_eq!(wf.status(), DefinitionStatus::Draft);
        assert_eq!(wf.version(), 1);
        assert_eq!(wf.trigger(), Trigger::OnStatusChange);
        assert_eq!(wf.summary().node_count, 2);
    }

    #[test]
    fn declared_status_is_not_trusted_on_decode() {
        let wf: WorkflowDefinition = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "name": "",
            "trigger": "manual",
            "status": "active",
            "nodes": [
                { "id": "s", "type": "start", "next": "ghost" },
                { "id": "s2", "type": "start", "next": "s" }
            ]
        }))
        .unwrap();

        assert_eq!(wf.status(), DefinitionStatus::Draft);
    }

    #[test]
    fn labels_and_description_survive_the_wire() {
        let mut wf = WorkflowDefinition::create(
            "renewal",
            Trigger::Manual,
            vec![Node::start("s", "e").with_label("Kick-off"), Node::end("e")],
        )
        .unwrap();
        wf.set_description("Remind customers a month before expiry").unwrap();

        let json = serde_json::to_value(&wf).unwrap();
        assert_eq!(json["nodes"][0]["label"], "Kick-off");
        assert_eq!(json["description"], "Remind customers a month before expiry");

        let back: WorkflowDefinition = serde_json::from_value(json).unwrap();
        assert_eq!(back.node("s").and_then(|n| n.label.as_deref()), Some("Kick-off"));
        assert_eq!(back.description(), Some("Remind customers a month before expiry"));

        wf.set_status(DefinitionStatus::Active);
        assert!(wf.set_description("too late").is_err());
        assert_eq!(wf.description(), Some("Remind customers a month before expiry"));
    }
}
