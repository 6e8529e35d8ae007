pub mod engine;
pub mod states;

pub use engine::{NegotiationFlow, WorkflowDefinition, WorkflowEngine, WorkflowTransitionError};
pub use states::{TransitionOutcome, WorkflowEvent};
