use serde::{Deserialize, Serialize};

use crate::domain::thread::ThreadStatus;

/// The events that move a negotiation thread through its lifecycle. Each is
/// emitted by exactly one orchestration path; there is no other way to
/// change a thread's status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowEvent {
    /// The gate approved the candidate without review; the turn committed.
    TurnCommitted,
    /// The gate demanded human sign-off; the candidate is parked.
    ReviewRequired,
    /// A human approved the parked candidate. Terminal approvals finalize
    /// the contract and close the thread.
    ResumeApproved { terminal: bool },
    /// A human rejected the parked candidate; the thread resumes taking
    /// turns and the feedback is forwarded to the next one.
    ResumeRejected,
    /// Explicit close by an operator.
    CloseRequested,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ThreadStatus,
    pub to: ThreadStatus,
    pub event: WorkflowEvent,
}
