//! Engine-level error types.

use effects::EffectError;
use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the workflow engine (definitions, lifecycle, execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Definition errors ------

    /// The definition failed structural validation. Carries every reason.
    #[error("workflow definition is invalid: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    /// A node could not be decoded into one of the known node shapes.
    #[error("malformed node '{node_id}': {reason}")]
    MalformedNode { node_id: String, reason: String },

    /// A delay node carries a duration string that cannot be parsed.
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),

    // ------ State errors ------

    /// The operation is not allowed in the entity's current status.
    #[error("cannot {operation} {entity} {id} while it is {status}")]
    InvalidState {
        entity: &'static str,
        id: Uuid,
        status: String,
        operation: &'static str,
    },

    /// The approver is not listed on the approval node.
    #[error("'{approver}' is not an approver for node '{node_id}'")]
    UnknownApprover { node_id: String, approver: String },

    /// No execution with this id is known to the store.
    #[error("no execution with id {0}")]
    UnknownExecution(Uuid),

    // ------ Execution errors ------

    /// The execution's cursor names a node missing from its snapshot.
    #[error("execution {execution_id} points at unknown node '{cursor}'")]
    CorruptExecution { execution_id: Uuid, cursor: String },

    /// A collaborator failed fatally or its retries were exhausted.
    #[error("node '{node_id}' failed after {attempts} attempt(s): {source}")]
    Collaborator {
        node_id: String,
        attempts: u32,
        #[source]
        source: EffectError,
    },
}

impl EngineError {
    pub(crate) fn invalid_state(
        entity: &'static str,
        id: Uuid,
        status: impl ToString,
        operation: &'static str,
    ) -> Self {
        Self::InvalidState {
            entity,
            id,
            status: status.to_string(),
            operation,
        }
    }
}
