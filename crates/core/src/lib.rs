pub mod config;
pub mod domain;
pub mod errors;
pub mod gate;
pub mod store;
pub mod workflow;

pub use domain::decision::{Candidate, DecisionContext, PendingDecision, ResumeAction, TurnId};
pub use domain::thread::{
    ContractId, Message, MessageRole, SupplierId, Thread, ThreadId, ThreadSnapshot, ThreadStatus,
};
pub use errors::{DomainError, OrchestrationError};
pub use gate::{ApprovalGate, GateDecision};
pub use store::{StoreError, ThreadStore};
pub use workflow::engine::{NegotiationFlow, WorkflowEngine, WorkflowTransitionError};
pub use workflow::states::{TransitionOutcome, WorkflowEvent};
