use async_trait::async_trait;
use thiserror::Error;

use crate::domain::thread::{Thread, ThreadId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("thread `{0}` already exists")]
    AlreadyExists(ThreadId),
    #[error("version conflict committing thread `{0}`")]
    VersionConflict(ThreadId),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Durable keyed storage for thread aggregates. `update` is a
/// compare-and-swap on `(id, expected_version)`: a lost race surfaces as
/// `VersionConflict`, never as a silent overwrite. Messages are append-only;
/// an implementation must never rewrite rows it has already committed.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn create(&self, thread: Thread) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &ThreadId) -> Result<Option<Thread>, StoreError>;

    /// Persists the aggregate iff the stored version still equals
    /// `expected_version`. The thread passed in already carries the bumped
    /// version (see `Thread::prepare_commit`).
    async fn update(&self, thread: Thread, expected_version: i64) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<Thread>, StoreError>;
}
