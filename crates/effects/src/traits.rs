//! The collaborator traits a host must provide to run executions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{ActionType, EffectError};

/// Performs the side effect behind an action or notification node.
///
/// `params` have already had their `{{path}}` placeholders resolved.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Perform the action and return whatever the backend reported.
    async fn invoke(
        &self,
        action: ActionType,
        params: &Map<String, Value>,
    ) -> Result<Value, EffectError>;
}

/// Clock plus "wake this execution later" registration for delay nodes.
///
/// The engine only records the due time; firing the resumption is the
/// scheduler's job.
#[async_trait]
pub trait Scheduler: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn schedule_resume(
        &self,
        execution_id: Uuid,
        due_at: DateTime<Utc>,
    ) -> Result<(), EffectError>;
}

/// Resolves who is acting, for the audit fields of the step log.
pub trait IdentityProvider: Send + Sync {
    fn current_user_id(&self) -> Option<String>;
}
