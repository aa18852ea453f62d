//! Execution storage and per-execution serialisation.
//!
//! Every execution lives behind its own `tokio::sync::Mutex`. The
//! [`WorkflowRuntime`] holds that lock for the whole of a step, approval,
//! resumption or cancellation, so two callers can never interleave on one
//! execution while different executions proceed in parallel. Suspended
//! executions hold no lock between calls.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::execution::{ApprovalDecision, WorkflowExecution};
use crate::executor::WorkflowEngine;
use crate::models::WorkflowDefinition;
use crate::EngineError;

/// Shared, lockable handle to one execution.
pub type ExecutionHandle = Arc<Mutex<WorkflowExecution>>;

/// Where executions are kept between calls.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn insert(&self, execution: WorkflowExecution) -> ExecutionHandle;

    async fn get(&self, id: Uuid) -> Option<ExecutionHandle>;

    async fn ids(&self) -> Vec<Uuid>;
}

#[derive(Debug, Default)]
pub struct InMemoryExecutionStore {
    executions: RwLock<HashMap<Uuid, ExecutionHandle>>,
}

impl InMemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn insert(&self, execution: WorkflowExecution) -> ExecutionHandle {
        let id = execution.id();
        let handle = Arc::new(Mutex::new(execution));
        self.executions.write().await.insert(id, Arc::clone(&handle));
        debug!(execution_id = %id, "execution stored");
        handle
    }

    async fn get(&self, id: Uuid) -> Option<ExecutionHandle> {
        self.executions.read().await.get(&id).cloned()
    }

    async fn ids(&self) -> Vec<Uuid> {
        self.executions.read().await.keys().copied().collect()
    }
}

/// Host-facing facade: an engine plus a store, addressed by execution id.
///
/// Every method returns a copy of the execution as it stood when the call
/// finished.
pub struct WorkflowRuntime<S = InMemoryExecutionStore> {
    engine: WorkflowEngine,
    store: S,
}

impl<S: ExecutionStore> WorkflowRuntime<S> {
    pub fn new(engine: WorkflowEngine, store: S) -> Self {
        Self { engine, store }
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub async fn start(
        &self,
        definition: &WorkflowDefinition,
        context: Map<String, Value>,
        trigger_payload: Value,
    ) -> Result<WorkflowExecution, EngineError> {
        let execution = self.engine.start_execution(definition, context, trigger_payload)?;
        let handle = self.store.insert(execution).await;
        let snapshot = handle.lock().await.clone();
        Ok(snapshot)
    }

    pub async fn get(&self, id: Uuid) -> Result<WorkflowExecution, EngineError> {
        let handle = self.handle(id).await?;
        let snapshot = handle.lock().await.clone();
        Ok(snapshot)
    }

    pub async fn step(&self, id: Uuid) -> Result<WorkflowExecution, EngineError> {
        let handle = self.handle(id).await?;
        let mut execution = handle.lock().await;
        self.engine.step(&mut execution).await?;
        Ok(execution.clone())
    }

    pub async fn resolve_approval(
        &self,
        id: Uuid,
        approver_id: &str,
        decision: ApprovalDecision,
    ) -> Result<WorkflowExecution, EngineError> {
        let handle = self.handle(id).await?;
        let mut execution = handle.lock().await;
        self.engine.resolve_approval(&mut execution, approver_id, decision)?;
        Ok(execution.clone())
    }

    pub async fn resume_delay(&self, id: Uuid) -> Result<WorkflowExecution, EngineError> {
        let handle = self.handle(id).await?;
        let mut execution = handle.lock().await;
        self.engine.resume_delay(&mut execution)?;
        Ok(execution.clone())
    }

    pub async fn cancel(&self, id: Uuid) -> Result<WorkflowExecution, EngineError> {
        let handle = self.handle(id).await?;
        let mut execution = handle.lock().await;
        self.engine.cancel(&mut execution)?;
        Ok(execution.clone())
    }

    async fn handle(&self, id: Uuid) -> Result<ExecutionHandle, EngineError> {
        self.store.get(id).await.ok_or(EngineError::UnknownExecution(id))
    }
}
