//! Definition lifecycle: draft → active ⇄ paused → completed / failed.
//!
//! Activation is gated on [`validate`]. Pausing a definition only stops new
//! executions from starting; executions already in flight keep going.

use tracing::{info, warn};

use crate::models::{DefinitionStatus, WorkflowDefinition};
use crate::validator::validate;
use crate::EngineError;

/// Terminal outcome a host may record for a definition as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retirement {
    Completed,
    Failed,
}

impl WorkflowDefinition {
    /// Validate and move to `active`. Allowed from `draft` and `paused`.
    ///
    /// # Errors
    /// - [`EngineError::InvalidState`] from any other status.
    /// - [`EngineError::Validation`] with every reason if the graph is
    ///   unsound; the status is left unchanged.
    pub fn activate(&mut self) -> Result<(), EngineError> {
        match self.status() {
            DefinitionStatus::Draft | DefinitionStatus::Paused => {}
            other => {
                return Err(EngineError::invalid_state("workflow", self.id(), other, "activate"))
            }
        }

        let report = validate(&*self);
        if !report.valid {
            warn!(workflow_id = %self.id(), errors = ?report.errors, "activation rejected");
            return Err(EngineError::Validation { errors: report.errors });
        }

        self.set_status(DefinitionStatus::Active);
        info!(workflow_id = %self.id(), version = self.version(), "workflow activated");
        Ok(())
    }

    /// Stop accepting new executions. Allowed from `active` only.
    pub fn pause(&mut self) -> Result<(), EngineError> {
        if self.status() != DefinitionStatus::Active {
            return Err(EngineError::invalid_state("workflow", self.id(), self.status(), "pause"));
        }
        self.set_status(DefinitionStatus::Paused);
        info!(workflow_id = %self.id(), "workflow paused");
        Ok(())
    }

    /// Re-activate a paused definition.
    pub fn resume(&mut self) -> Result<(), EngineError> {
        if self.status() != DefinitionStatus::Paused {
            return Err(EngineError::invalid_state("workflow", self.id(), self.status(), "resume"));
        }
        self.activate()
    }

    /// Close an `active` or `paused` definition for good.
    ///
    /// The engine never calls this; it is for host-side aggregate reporting.
    pub fn retire(&mut self, outcome: Retirement) -> Result<(), EngineError> {
        match self.status() {
            DefinitionStatus::Active | DefinitionStatus::Paused => {}
            other => return Err(EngineError::invalid_state("workflow", self.id(), other, "retire")),
        }
        let status = match outcome {
            Retirement::Completed => DefinitionStatus::Completed,
            Retirement::Failed => DefinitionStatus::Failed,
        };
        self.set_status(status);
        info!(workflow_id = %self.id(), %status, "workflow retired");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Node, Trigger};

    fn valid_draft() -> WorkflowDefinition {
        WorkflowDefinition::create(
            "Lapsed policy win-back",
            Trigger::OnStatusChange,
            vec![Node::start("s", "e"), Node::end("e")],
        )
        .unwrap()
    }

    #[test]
    fn activate_valid_draft() {
        let mut wf = valid_draft();
        wf.activate().unwrap();
        assert_eq!(wf.status(), DefinitionStatus::Active);
    }

    #[test]
    fn invalid_definition_is_never_activated() {
        let mut wf = WorkflowDefinition::create("broken", Trigger::Manual, vec![Node::end("e")]).unwrap();

        let err = wf.activate().unwrap_err();
        match err {
            EngineError::Validation { errors } => {
                assert_eq!(errors, vec!["Start node is missing"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(wf.status(), DefinitionStatus::Draft);
    }

    #[test]
    fn pause_and_resume_round_trip() {
        let mut wf = valid_draft();
        assert!(wf.pause().is_err());

        wf.activate().unwrap();
        wf.pause().unwrap();
        assert_eq!(wf.status(), DefinitionStatus::Paused);
        assert!(wf.pause().is_err());

        wf.resume().unwrap();
        assert_eq!(wf.status(), DefinitionStatus::Active);
        assert!(matches!(wf.resume(), Err(EngineError::InvalidState { .. })));
    }

    #[test]
    fn activating_an_active_definition_is_rejected() {
        let mut wf = valid_draft();
        wf.activate().unwrap();
        assert!(matches!(wf.activate(), Err(EngineError::InvalidState { operation: "activate", .. })));
    }

    #[test]
    fn retired_definitions_cannot_come_back() {
        let mut wf = valid_draft();
        assert!(wf.retire(Retirement::Completed).is_err());

        wf.activate().unwrap();
        wf.retire(Retirement::Failed).unwrap();
        assert_eq!(wf.status(), DefinitionStatus::Failed);
        assert!(wf.activate().is_err());
        assert!(wf.pause().is_err());
    }
}
