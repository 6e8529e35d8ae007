use thiserror::Error;

use crate::domain::thread::ThreadStatus;
use crate::workflow::states::{TransitionOutcome, WorkflowEvent};

pub trait WorkflowDefinition {
    fn initial_status(&self) -> ThreadStatus;
    fn transition(
        &self,
        current: ThreadStatus,
        event: &WorkflowEvent,
    ) -> Result<TransitionOutcome, WorkflowTransitionError>;
}

/// The negotiation lifecycle: `active` accepts turns, `paused` awaits a
/// human decision, `completed` is terminal.
#[derive(Clone, Debug, Default)]
pub struct NegotiationFlow;

impl WorkflowDefinition for NegotiationFlow {
    fn initial_status(&self) -> ThreadStatus {
        ThreadStatus::Active
    }

    fn transition(
        &self,
        current: ThreadStatus,
        event: &WorkflowEvent,
    ) -> Result<TransitionOutcome, WorkflowTransitionError> {
        transition_negotiation(current, event)
    }
}

pub struct WorkflowEngine<F> {
    flow: F,
}

impl<F> WorkflowEngine<F>
where
    F: WorkflowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_status(&self) -> ThreadStatus {
        self.flow.initial_status()
    }

    pub fn apply(
        &self,
        current: ThreadStatus,
        event: &WorkflowEvent,
    ) -> Result<TransitionOutcome, WorkflowTransitionError> {
        self.flow.transition(current, event)
    }
}

impl Default for WorkflowEngine<NegotiationFlow> {
    fn default() -> Self {
        Self::new(NegotiationFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowTransitionError {
    #[error("invalid transition from {status:?} using event {event:?}")]
    InvalidTransition { status: ThreadStatus, event: WorkflowEvent },
}

fn transition_negotiation(
    current: ThreadStatus,
    event: &WorkflowEvent,
) -> Result<TransitionOutcome, WorkflowTransitionError> {
    use ThreadStatus::{Active, Completed, Paused};
    use WorkflowEvent::{
        CloseRequested, ResumeApproved, ResumeRejected, ReviewRequired, TurnCommitted,
    };

    let to = match (current, event) {
        (Active, TurnCommitted) => Active,
        (Active, ReviewRequired) => Paused,
        (Paused, ResumeApproved { terminal: false }) | (Paused, ResumeRejected) => Active,
        (Paused, ResumeApproved { terminal: true }) => Completed,
        (Active, CloseRequested) | (Paused, CloseRequested) => Completed,
        _ => {
            return Err(WorkflowTransitionError::InvalidTransition {
                status: current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current, to, event: event.clone() })
}
