//! Workflow status transitions.
//!
//! ```text
//! active  --pause-->  paused
//! paused  --resume--> active
//! active  --fail-->   failed
//! paused  --fail-->   failed
//! active  --(last step completed)--> completed
//! ```
//!
//! `completed` and `failed` are terminal. Requests that would leave the
//! status unchanged (pause on paused, resume on active, fail on failed) are
//! no-ops rather than errors.

use stepwise_types::error::WorkflowError;
use stepwise_types::workflow::{WorkflowAction, WorkflowStatus};

/// Result of applying an action to a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status changes to the given value.
    Move(WorkflowStatus),
    /// The workflow is already where the action would take it.
    NoOp,
}

/// Status an action moves a workflow towards.
pub fn target(action: WorkflowAction) -> WorkflowStatus {
    match action {
        WorkflowAction::Pause => WorkflowStatus::Paused,
        WorkflowAction::Resume => WorkflowStatus::Active,
        WorkflowAction::Fail => WorkflowStatus::Failed,
    }
}

/// Decide what `action` does to a workflow currently in `from`.
pub fn transition(from: WorkflowStatus, action: WorkflowAction) -> Result<Transition, WorkflowError> {
    let to = target(action);
    if from == to {
        return Ok(Transition::NoOp);
    }
    if from.is_terminal() {
        return Err(WorkflowError::InvalidTransition { from, to });
    }
    match (from, action) {
        (WorkflowStatus::Active, WorkflowAction::Pause)
        | (WorkflowStatus::Paused, WorkflowAction::Resume)
        | (WorkflowStatus::Active | WorkflowStatus::Paused, WorkflowAction::Fail) => {
            Ok(Transition::Move(to))
        }
        _ => Err(WorkflowError::InvalidTransition { from, to }),
    }
}

/// Steps may only be completed while the workflow is active.
pub fn ensure_can_complete_step(from: WorkflowStatus) -> Result<(), WorkflowError> {
    if from == WorkflowStatus::Active {
        Ok(())
    } else {
        Err(WorkflowError::InvalidTransition {
            from,
            to: WorkflowStatus::Completed,
        })
    }
}
