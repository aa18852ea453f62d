//! Execution state: one running instance of a definition.
//!
//! An execution owns a snapshot of the node graph taken when it started, its
//! own variable context, and an append-only step log. Only the engine
//! mutates it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    WaitingApproval,
    Paused,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::WaitingApproval => write!(f, "waiting_approval"),
            Self::Paused => write!(f, "paused"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Decision supplied by an approver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Started,
    Completed,
    Branched,
    Approved,
    Rejected,
    Delayed,
    Ended,
    Failed,
    Cancelled,
}

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLogEntry {
    pub node_id: String,
    pub entered_at: DateTime<Utc>,
    pub exited_at: DateTime<Utc>,
    pub outcome: StepOutcome,
    /// Which condition branch was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Dispatcher calls made for an action node, retries included.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub attempts: u32,
    #[serde(default)]
    pub cancelled: bool,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl StepLogEntry {
    pub(crate) fn new(
        node_id: impl Into<String>,
        entered_at: DateTime<Utc>,
        exited_at: DateTime<Utc>,
        outcome: StepOutcome,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            entered_at,
            exited_at,
            outcome,
            branch: None,
            actor: None,
            error: None,
            attempts: 0,
            cancelled: false,
        }
    }

    pub(crate) fn with_actor(mut self, actor: Option<String>) -> Self {
        self.actor = actor;
        self
    }

    pub(crate) fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    id: Uuid,
    workflow_id: Uuid,
    workflow_version: u32,
    status: ExecutionStatus,
    cursor: String,
    context: Map<String, Value>,
    #[serde(default)]
    trigger_payload: Value,
    graph: Arc<[Node]>,
    step_log: Vec<StepLogEntry>,
    /// When the current approval/delay node was entered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    suspended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resume_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failed_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_by: Option<String>,
    started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        workflow_id: Uuid,
        workflow_version: u32,
        graph: Arc<[Node]>,
        cursor: String,
        context: Map<String, Value>,
        trigger_payload: Value,
        started_by: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            workflow_version,
            status: ExecutionStatus::Running,
            cursor,
            context,
            trigger_payload,
            graph,
            step_log: Vec::new(),
            suspended_at: None,
            resume_at: None,
            failed_node: None,
            started_by,
            started_at,
            finished_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    pub fn workflow_version(&self) -> u32 {
        self.workflow_version
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn trigger_payload(&self) -> &Value {
        &self.trigger_payload
    }

    /// The node graph as it was when the execution started.
    pub fn graph(&self) -> &[Node] {
        &self.graph
    }

    pub fn step_log(&self) -> &[StepLogEntry] {
        &self.step_log
    }

    pub fn resume_at(&self) -> Option<DateTime<Utc>> {
        self.resume_at
    }

    pub fn failed_node(&self) -> Option<&str> {
        self.failed_node.as_deref()
    }

    pub fn started_by(&self) -> Option<&str> {
        self.started_by.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// The node under the cursor, if the snapshot has it.
    pub fn current_node(&self) -> Option<&Node> {
        self.graph.iter().find(|n| n.id == self.cursor)
    }

    // ------------------------------------------------------------------
    // Engine-side mutation
    // ------------------------------------------------------------------

    pub(crate) fn snapshot(&self) -> Arc<[Node]> {
        Arc::clone(&self.graph)
    }

    pub(crate) fn context_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.context
    }

    pub(crate) fn advance_to(&mut self, next: &str) {
        self.cursor = next.to_owned();
        self.status = ExecutionStatus::Running;
    }

    pub(crate) fn suspend(&mut self, status: ExecutionStatus, at: DateTime<Utc>) {
        self.status = status;
        self.suspended_at = Some(at);
    }

    pub(crate) fn set_resume_at(&mut self, due: DateTime<Utc>) {
        self.resume_at = Some(due);
    }

    /// Clear suspension bookkeeping and return when the node was entered.
    pub(crate) fn take_suspension(&mut self) -> Option<DateTime<Utc>> {
        self.resume_at = None;
        self.suspended_at.take()
    }

    pub(crate) fn suspended_at(&self) -> Option<DateTime<Utc>> {
        self.suspended_at
    }

    pub(crate) fn complete(&mut self, at: DateTime<Utc>) {
        self.status = ExecutionStatus::Completed;
        self.finished_at = Some(at);
    }

    /// Terminal failure. `entry` explains why and is always logged.
    pub(crate) fn fail(&mut self, node_id: Option<String>, entry: StepLogEntry) {
        let at = entry.exited_at;
        self.record(entry);
        self.status = ExecutionStatus::Failed;
        self.failed_node = node_id;
        self.suspended_at = None;
        self.resume_at = None;
        self.finished_at = Some(at);
    }

    /// Append to the step log.
    ///
    /// Entries stay ordered by `entered_at` even if the clock steps back.
    pub(crate) fn record(&mut self, mut entry: StepLogEntry) {
        if let Some(last) = self.step_log.last() {
            if entry.entered_at < last.entered_at {
                entry.entered_at = last.entered_at;
            }
        }
        if entry.exited_at < entry.entered_at {
            entry.exited_at = entry.entered_at;
        }
        self.step_log.push(entry);
    }
}
