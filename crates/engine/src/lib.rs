//! `engine` crate: workflow definitions, validation, lifecycle and the
//! single-step execution engine.

pub mod models;
pub mod error;
pub mod dag;
pub mod validator;
pub mod lifecycle;
pub mod duration;
pub mod condition;
pub mod template;
pub mod execution;
pub mod executor;
pub mod store;

pub use models::{
    ActionDescriptor, Condition, ConditionOperator, DefinitionStatus, Node, NodeKind, Trigger,
    WorkflowDefinition, WorkflowSummary, WorkflowView,
};
pub use error::EngineError;
pub use validator::{validate, ValidationReport};
pub use lifecycle::Retirement;
pub use execution::{ApprovalDecision, ExecutionStatus, StepLogEntry, StepOutcome, WorkflowExecution};
pub use executor::{ExecutorConfig, RetryPolicy, WorkflowEngine};
pub use store::{ExecutionStore, InMemoryExecutionStore, WorkflowRuntime};
