//! Agent runtime - turn execution and workflow orchestration
//!
//! This crate is the writing side of the negotiation system:
//!
//! 1. **Proposal** (`proposer`) - an opaque reasoning capability turns the
//!    conversation and the latest input into a candidate action
//! 2. **Execution** (`executor`) - one deadline-bounded evaluation cycle,
//!    stamped with an audit turn id
//! 3. **Orchestration** (`runtime`) - per-thread serialization, the approval
//!    gate, and the single committed store write per mutation
//! 4. **Simulation** (`simulation`) - a persona-driven counterparty whose
//!    replies re-enter the system through the same gated path
//!
//! # Safety Principle
//!
//! The reasoning capability only ever *proposes*. Whether a candidate
//! reaches the thread is decided by the approval gate inside the runtime's
//! critical section - no caller, including the simulator, can commit a
//! document-impacting action without a human decision.

pub mod executor;
pub mod llm;
pub mod proposer;
pub mod runtime;
pub mod simulation;

pub use executor::{ExecutorError, TurnExecutor};
pub use proposer::{HeuristicProposer, Proposal, Proposer, ProposerError};
pub use runtime::{CreateThreadParams, NegotiationRuntime};
pub use simulation::{
    HistoryEntry, NegotiationStyle, PersonaLibrary, SimulationError, SupplierPersona,
    SupplierSimulator,
};
