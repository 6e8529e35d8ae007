use thiserror::Error;

use crate::domain::thread::{ThreadId, ThreadStatus};
use crate::store::StoreError;
use crate::workflow::engine::WorkflowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid thread transition from {from:?} to {to:?}")]
    InvalidThreadTransition { from: ThreadStatus, to: ThreadStatus },
    #[error(transparent)]
    WorkflowTransition(#[from] WorkflowTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// The error surface of the workflow state machine's public contract.
/// Conflicts (paused / not-paused / completed) are distinct from transient
/// failures so clients can choose poll-and-refetch versus retry-with-backoff.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum OrchestrationError {
    #[error("thread `{0}` was not found")]
    ThreadNotFound(ThreadId),
    #[error("thread `{0}` is paused awaiting a decision; resume before sending new input")]
    ThreadPaused(ThreadId),
    #[error("thread `{0}` is completed and accepts no further turns")]
    ThreadCompleted(ThreadId),
    #[error("thread `{0}` is not paused; refetch the snapshot")]
    NotPaused(ThreadId),
    #[error("thread `{0}` has no pending decision context; refetch the snapshot")]
    NoPendingContext(ThreadId),
    #[error("turn executor unavailable: {0}")]
    ExecutorUnavailable(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrchestrationError {
    /// Stale-client conflicts: the request was well-formed but raced the
    /// thread's lifecycle. Safe to resolve by refetching the snapshot.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ThreadPaused(_)
                | Self::ThreadCompleted(_)
                | Self::NotPaused(_)
                | Self::NoPendingContext(_)
        )
    }

    /// Transient failures: safe to retry the same call with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExecutorUnavailable(_)
                | Self::Store(StoreError::Backend(_))
                | Self::Store(StoreError::VersionConflict(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::thread::ThreadId;
    use crate::store::StoreError;

    use super::OrchestrationError;

    fn id() -> ThreadId {
        ThreadId("T-1".to_string())
    }

    #[test]
    fn pause_conflicts_are_not_retryable() {
        let error = OrchestrationError::ThreadPaused(id());
        assert!(error.is_conflict());
        assert!(!error.is_retryable());
    }

    #[test]
    fn executor_unavailability_is_retryable() {
        let error = OrchestrationError::ExecutorUnavailable("deadline exceeded".to_string());
        assert!(error.is_retryable());
        assert!(!error.is_conflict());
    }

    #[test]
    fn not_found_is_neither_conflict_nor_retryable() {
        let error = OrchestrationError::ThreadNotFound(id());
        assert!(!error.is_conflict());
        assert!(!error.is_retryable());
    }

    #[test]
    fn store_version_conflict_is_safe_to_retry() {
        let error = OrchestrationError::Store(StoreError::VersionConflict(id()));
        assert!(error.is_retryable());
    }
}
