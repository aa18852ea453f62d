//! Workflow execution engine.
//!
//! `WorkflowEngine` advances one [`WorkflowExecution`] through its snapshotted
//! graph, one node per [`WorkflowEngine::step`] call, so a host can
//! interleave steps with its own I/O:
//! 1. `start` moves to `next`.
//! 2. `action`/`notification` resolve `{{...}}` params and call the
//!    `ActionDispatcher`, retrying `Retryable` failures per the host's
//!    [`RetryPolicy`].
//! 3. `condition` evaluates against the context and takes a branch.
//! 4. `approval` waits for [`WorkflowEngine::resolve_approval`].
//! 5. `delay` registers a resumption with the `Scheduler` and waits for
//!    [`WorkflowEngine::resume_delay`].
//! 6. `end` completes the execution.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};

use effects::{ActionDispatcher, ActionType, EffectError, IdentityProvider, Scheduler};

use crate::condition;
use crate::duration::parse_duration;
use crate::execution::{
    ApprovalDecision, ExecutionStatus, StepLogEntry, StepOutcome, WorkflowExecution,
};
use crate::models::{ActionDescriptor, DefinitionStatus, NodeKind, WorkflowDefinition};
use crate::template::{self, TemplateScope};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How often a `Retryable` collaborator failure is retried.
///
/// Supplied by the host; the default retries nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay for exponential back-off between retries.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 100,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay_ms: u64::try_from(base_delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Back-off before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Tuning knobs for the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub retry: RetryPolicy,
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Stateless stepper. All execution state lives in the `WorkflowExecution`.
pub struct WorkflowEngine {
    dispatcher: Arc<dyn ActionDispatcher>,
    scheduler: Arc<dyn Scheduler>,
    identity: Arc<dyn IdentityProvider>,
    config: ExecutorConfig,
}

impl WorkflowEngine {
    pub fn new(
        dispatcher: Arc<dyn ActionDispatcher>,
        scheduler: Arc<dyn Scheduler>,
        identity: Arc<dyn IdentityProvider>,
        config: ExecutorConfig,
    ) -> Self {
        Self { dispatcher, scheduler, identity, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Start a new execution of an active definition.
    ///
    /// The execution snapshots the definition's graph; later edits to the
    /// definition (through a new version) never reach it.
    ///
    /// # Errors
    /// - [`EngineError::InvalidState`] unless the definition is `active`.
    /// - [`EngineError::Validation`] if the graph has no start node.
    #[instrument(skip_all, fields(workflow_id = %definition.id()))]
    pub fn start_execution(
        &self,
        definition: &WorkflowDefinition,
        context: Map<String, Value>,
        trigger_payload: Value,
    ) -> Result<WorkflowExecution, EngineError> {
        if definition.status() != DefinitionStatus::Active {
            return Err(EngineError::invalid_state(
                "workflow",
                definition.id(),
                definition.status(),
                "start an execution of",
            ));
        }

        let start = definition
            .nodes()
            .iter()
            .find(|n| n.is_start())
            .ok_or_else(|| EngineError::Validation {
                errors: vec!["Start node is missing".to_owned()],
            })?;

        let execution = WorkflowExecution::new(
            definition.id(),
            definition.version(),
            definition.nodes().to_vec().into(),
            start.id.clone(),
            context,
            trigger_payload,
            self.identity.current_user_id(),
            self.scheduler.now(),
        );

        info!(execution_id = %execution.id(), "execution started");
        Ok(execution)
    }

    /// Advance the execution by exactly one node.
    ///
    /// # Errors
    /// - [`EngineError::InvalidState`] if the execution is not `running`;
    ///   the execution is left unchanged.
    /// - [`EngineError::CorruptExecution`] if the cursor is not in the
    ///   snapshot; the execution is failed first.
    /// - [`EngineError::Collaborator`] if an action could not be performed;
    ///   the execution is failed first.
    /// - [`EngineError::InvalidDuration`] for an unparseable delay; the
    ///   execution is failed first.
    #[instrument(skip_all, fields(execution_id = %execution.id(), cursor = %execution.cursor()))]
    pub async fn step(&self, execution: &mut WorkflowExecution) -> Result<(), EngineError> {
        if execution.status() != ExecutionStatus::Running {
            return Err(EngineError::invalid_state(
                "execution",
                execution.id(),
                execution.status(),
                "step",
            ));
        }

        let now = self.scheduler.now();
        let graph = execution.snapshot();
        let Some(node) = graph.iter().find(|n| n.id == execution.cursor()) else {
            return Err(self.corrupt(execution));
        };
        let actor = self.identity.current_user_id();

        match &node.kind {
            NodeKind::Start { next } => {
                execution.record(
                    StepLogEntry::new(&node.id, now, now, StepOutcome::Started).with_actor(actor),
                );
                execution.advance_to(next);
                info!(node_id = %node.id, next = %next, "started");
            }

            NodeKind::Action { action, next } | NodeKind::Notification { action, next } => {
                self.run_action(execution, &node.id, action, next, actor).await?;
            }

            NodeKind::Condition { condition, true_next, false_next } => {
                let taken = condition::evaluate(condition, execution.context());
                let target = if taken { true_next } else { false_next };

                let mut entry =
                    StepLogEntry::new(&node.id, now, now, StepOutcome::Branched).with_actor(actor);
                entry.branch = Some(taken);
                execution.record(entry);
                execution.advance_to(target);
                info!(node_id = %node.id, branch = taken, next = %target, "condition evaluated");
            }

            NodeKind::Approval { approvers, .. } => {
                execution.suspend(ExecutionStatus::WaitingApproval, now);
                info!(node_id = %node.id, ?approvers, "waiting for approval");
            }

            NodeKind::Delay { config, .. } => {
                let due = match parse_duration(&config.duration)
                    .and_then(|d| {
                        now.checked_add_signed(d)
                            .ok_or_else(|| EngineError::InvalidDuration(config.duration.clone()))
                    }) {
                    Ok(due) => due,
                    Err(err) => {
                        error!(node_id = %node.id, "{err}");
                        execution.fail(
                            Some(node.id.clone()),
                            StepLogEntry::new(&node.id, now, now, StepOutcome::Failed)
                                .with_actor(actor)
                                .with_error(err.to_string()),
                        );
                        return Err(err);
                    }
                };

                if let Err(source) = self.scheduler.schedule_resume(execution.id(), due).await {
                    error!(node_id = %node.id, "could not schedule resumption: {source}");
                    execution.fail(
                        Some(node.id.clone()),
                        StepLogEntry::new(&node.id, now, self.scheduler.now(), StepOutcome::Failed)
                            .with_actor(actor)
                            .with_error(source.to_string()),
                    );
                    return Err(EngineError::Collaborator {
                        node_id: node.id.clone(),
                        attempts: 1,
                        source,
                    });
                }

                execution.suspend(ExecutionStatus::Paused, now);
                execution.set_resume_at(due);
                info!(node_id = %node.id, due_at = %due, "delayed");
            }

            NodeKind::End => {
                execution.record(
                    StepLogEntry::new(&node.id, now, now, StepOutcome::Ended).with_actor(actor),
                );
                execution.complete(now);
                info!(node_id = %node.id, "execution completed");
            }
        }

        Ok(())
    }

    /// Step until the execution suspends or terminates.
    ///
    /// Loops are allowed in definitions, so this gives up after `max_steps`
    /// and returns with the execution still `running`.
    pub async fn run_until_blocked(
        &self,
        execution: &mut WorkflowExecution,
        max_steps: usize,
    ) -> Result<(), EngineError> {
        for _ in 0..max_steps {
            if execution.status() != ExecutionStatus::Running {
                return Ok(());
            }
            self.step(execution).await?;
        }
        if execution.status() == ExecutionStatus::Running {
            warn!(execution_id = %execution.id(), max_steps, "step budget exhausted");
        }
        Ok(())
    }

    /// Apply an approver's decision to an execution waiting at an approval node.
    ///
    /// `approved` resumes at the node's `next`; `rejected` fails the execution.
    ///
    /// # Errors
    /// - [`EngineError::InvalidState`] unless the execution is `waiting_approval`.
    /// - [`EngineError::UnknownApprover`] if `approver_id` is not listed on the
    ///   node; nothing changes.
    /// - [`EngineError::CorruptExecution`] if the cursor is not an approval node.
    #[instrument(skip(self, execution), fields(execution_id = %execution.id()))]
    pub fn resolve_approval(
        &self,
        execution: &mut WorkflowExecution,
        approver_id: &str,
        decision: ApprovalDecision,
    ) -> Result<(), EngineError> {
        if execution.status() != ExecutionStatus::WaitingApproval {
            return Err(EngineError::invalid_state(
                "execution",
                execution.id(),
                execution.status(),
                "resolve an approval on",
            ));
        }

        let graph = execution.snapshot();
        let Some(node) = graph.iter().find(|n| n.id == execution.cursor()) else {
            return Err(self.corrupt(execution));
        };
        let NodeKind::Approval { approvers, next } = &node.kind else {
            return Err(self.corrupt(execution));
        };
        if !approvers.iter().any(|a| a == approver_id) {
            return Err(EngineError::UnknownApprover {
                node_id: node.id.clone(),
                approver: approver_id.to_owned(),
            });
        }

        let now = self.scheduler.now();
        let entered_at = execution.take_suspension().unwrap_or(now);
        let actor = Some(approver_id.to_owned());

        match decision {
            ApprovalDecision::Approved => {
                execution.record(
                    StepLogEntry::new(&node.id, entered_at, now, StepOutcome::Approved)
                        .with_actor(actor),
                );
                execution.advance_to(next);
                info!(node_id = %node.id, approver_id, "approval granted");
            }
            ApprovalDecision::Rejected => {
                execution.fail(
                    Some(node.id.clone()),
                    StepLogEntry::new(&node.id, entered_at, now, StepOutcome::Rejected)
                        .with_actor(actor)
                        .with_error(format!("rejected by {approver_id}")),
                );
                warn!(node_id = %node.id, approver_id, "approval rejected");
            }
        }

        Ok(())
    }

    /// Leave a delay node once its due time has passed.
    ///
    /// # Errors
    /// - [`EngineError::InvalidState`] unless the execution is `paused` and
    ///   the due time has been reached.
    /// - [`EngineError::CorruptExecution`] if the cursor is not a delay node.
    #[instrument(skip_all, fields(execution_id = %execution.id()))]
    pub fn resume_delay(&self, execution: &mut WorkflowExecution) -> Result<(), EngineError> {
        if execution.status() != ExecutionStatus::Paused {
            return Err(EngineError::invalid_state(
                "execution",
                execution.id(),
                execution.status(),
                "resume",
            ));
        }

        let now = self.scheduler.now();
        if let Some(due) = execution.resume_at() {
            if now < due {
                return Err(EngineError::invalid_state(
                    "execution",
                    execution.id(),
                    format!("paused until {due}"),
                    "resume",
                ));
            }
        }

        let graph = execution.snapshot();
        let Some(node) = graph.iter().find(|n| n.id == execution.cursor()) else {
            return Err(self.corrupt(execution));
        };
        let NodeKind::Delay { next, .. } = &node.kind else {
            return Err(self.corrupt(execution));
        };

        let entered_at = execution.take_suspension().unwrap_or(now);
        execution.record(
            StepLogEntry::new(&node.id, entered_at, now, StepOutcome::Delayed)
                .with_actor(self.identity.current_user_id()),
        );
        execution.advance_to(next);
        info!(node_id = %node.id, next = %next, "delay elapsed");
        Ok(())
    }

    /// Force a non-terminal execution into `failed`.
    ///
    /// Side effects already performed are not undone.
    ///
    /// # Errors
    /// [`EngineError::InvalidState`] if the execution already finished.
    #[instrument(skip_all, fields(execution_id = %execution.id()))]
    pub fn cancel(&self, execution: &mut WorkflowExecution) -> Result<(), EngineError> {
        if execution.status().is_terminal() {
            return Err(EngineError::invalid_state(
                "execution",
                execution.id(),
                execution.status(),
                "cancel",
            ));
        }

        let now = self.scheduler.now();
        let entered_at = execution.suspended_at().unwrap_or(now);
        let node_id = execution.cursor().to_owned();
        let mut entry = StepLogEntry::new(&node_id, entered_at, now, StepOutcome::Cancelled)
            .with_actor(self.identity.current_user_id())
            .with_error("cancelled");
        entry.cancelled = true;

        execution.fail(None, entry);
        warn!(node_id = %node_id, "execution cancelled");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    async fn run_action(
        &self,
        execution: &mut WorkflowExecution,
        node_id: &str,
        action: &ActionDescriptor,
        next: &str,
        actor: Option<String>,
    ) -> Result<(), EngineError> {
        let entered_at = self.scheduler.now();
        let params = template::resolve_params(
            &action.params,
            TemplateScope {
                context: execution.context(),
                trigger: execution.trigger_payload(),
            },
        );

        let update = if action.action_type == ActionType::UpdateField {
            match params.get("field").and_then(Value::as_str) {
                Some(field) => Some((
                    field.to_owned(),
                    params.get("value").cloned().unwrap_or(Value::Null),
                )),
                None => {
                    let source =
                        EffectError::Fatal("update_field requires a string 'field' param".into());
                    return Err(self.fail_action(execution, node_id, entered_at, actor, 0, source));
                }
            }
        } else {
            None
        };

        match self.dispatch_with_retry(node_id, action.action_type, &params).await {
            Ok((_output, attempts)) => {
                if let Some((field, value)) = update {
                    template::set_in_map(execution.context_mut(), &field, value);
                }

                let mut entry = StepLogEntry::new(
                    node_id,
                    entered_at,
                    self.scheduler.now(),
                    StepOutcome::Completed,
                )
                .with_actor(actor);
                entry.attempts = attempts;
                execution.record(entry);
                execution.advance_to(next);
                info!(node_id, action = %action.action_type, attempts, "action completed");
                Ok(())
            }
            Err((source, attempts)) => {
                Err(self.fail_action(execution, node_id, entered_at, actor, attempts, source))
            }
        }
    }

    /// Call the dispatcher, retrying `Retryable` errors with exponential back-off.
    ///
    /// Returns the output or the last error, together with the number of
    /// attempts made.
    async fn dispatch_with_retry(
        &self,
        node_id: &str,
        action: ActionType,
        params: &Map<String, Value>,
    ) -> Result<(Value, u32), (EffectError, u32)> {
        let policy = self.config.retry;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.dispatcher.invoke(action, params).await {
                Ok(output) => return Ok((output, attempts)),

                Err(err @ EffectError::Fatal(_)) => return Err((err, attempts)),

                Err(err @ EffectError::Retryable(_)) => {
                    let retry = attempts;
                    if retry > policy.max_retries {
                        return Err((err, attempts));
                    }

                    let delay = policy.delay_for(retry);
                    warn!(
                        "node '{}' retryable error (retry {}/{}), retrying in {:?}: {}",
                        node_id, retry, policy.max_retries, delay, err.message()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn fail_action(
        &self,
        execution: &mut WorkflowExecution,
        node_id: &str,
        entered_at: chrono::DateTime<Utc>,
        actor: Option<String>,
        attempts: u32,
        source: EffectError,
    ) -> EngineError {
        error!(node_id, attempts, "action failed: {source}");
        let mut entry =
            StepLogEntry::new(node_id, entered_at, self.scheduler.now(), StepOutcome::Failed)
                .with_actor(actor)
                .with_error(source.to_string());
        entry.attempts = attempts;
        execution.fail(Some(node_id.to_owned()), entry);

        EngineError::Collaborator {
            node_id: node_id.to_owned(),
            attempts,
            source,
        }
    }

    /// Fail an execution whose cursor cannot be resolved and build the error.
    fn corrupt(&self, execution: &mut WorkflowExecution) -> EngineError {
        let now = self.scheduler.now();
        let cursor = execution.cursor().to_owned();
        error!(cursor = %cursor, "cursor does not resolve to a usable node");
        execution.fail(
            Some(cursor.clone()),
            StepLogEntry::new(&cursor, now, now, StepOutcome::Failed)
                .with_actor(self.identity.current_user_id())
                .with_error(format!("cursor '{cursor}' does not resolve to a usable node")),
        );
        EngineError::CorruptExecution {
            execution_id: execution.id(),
            cursor,
        }
    }
}
