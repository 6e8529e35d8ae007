use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use parley_core::{Candidate, DecisionContext, Thread, TurnId};

use crate::proposer::{Proposer, ProposerError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExecutorError {
    /// Transient: the capability timed out or failed; safe to retry.
    #[error("turn executor unavailable: {0}")]
    Unavailable(String),
    /// Terminal for this turn: the capability declined to produce an action.
    #[error("turn executor declined: {0}")]
    Rejected(String),
}

/// Runs exactly one evaluation cycle against the reasoning capability.
/// Stateless per invocation; retry deduplication is the orchestration
/// layer's responsibility, keyed on the turn id allocated here.
pub struct TurnExecutor {
    proposer: Arc<dyn Proposer>,
    deadline: Duration,
}

impl TurnExecutor {
    pub fn new(proposer: Arc<dyn Proposer>, deadline: Duration) -> Self {
        Self { proposer, deadline }
    }

    pub async fn execute(
        &self,
        thread: &Thread,
        input: &str,
        prior_feedback: Option<&str>,
    ) -> Result<Candidate, ExecutorError> {
        let turn_id = TurnId(Uuid::new_v4().to_string());

        let proposal =
            match tokio::time::timeout(self.deadline, self.proposer.propose(thread, input, prior_feedback))
                .await
            {
                Err(_) => {
                    return Err(ExecutorError::Unavailable(format!(
                        "proposer exceeded the {}ms deadline",
                        self.deadline.as_millis()
                    )));
                }
                Ok(Err(ProposerError::Unavailable(message))) => {
                    return Err(ExecutorError::Unavailable(message));
                }
                Ok(Err(ProposerError::Declined(message))) => {
                    return Err(ExecutorError::Rejected(message));
                }
                Ok(Ok(proposal)) => proposal,
            };

        Ok(Candidate {
            message: proposal.message,
            context: DecisionContext {
                strategy: proposal.strategy,
                reasoning: proposal.reasoning,
                redline: proposal.redline,
                turn_id,
            },
            risk: proposal.risk,
            terminal: proposal.terminal,
        })
    }
}
