use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use parley_core::{StoreError, Thread, ThreadId, ThreadStore};

/// Store twin for unit tests and the CLI smoke flow: same contract as the
/// SQL store, including the version compare-and-swap, without a database.
#[derive(Default)]
pub struct InMemoryThreadStore {
    threads: Mutex<HashMap<String, Thread>>,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("in-memory store mutex poisoned".to_string())
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn create(&self, thread: Thread) -> Result<(), StoreError> {
        let mut threads = self.threads.lock().map_err(|_| poisoned())?;
        if threads.contains_key(&thread.id.0) {
            return Err(StoreError::AlreadyExists(thread.id.clone()));
        }
        threads.insert(thread.id.0.clone(), thread);
        Ok(())
    }

    async fn find_by_id(&self, id: &ThreadId) -> Result<Option<Thread>, StoreError> {
        let threads = self.threads.lock().map_err(|_| poisoned())?;
        Ok(threads.get(&id.0).cloned())
    }

    async fn update(&self, thread: Thread, expected_version: i64) -> Result<(), StoreError> {
        let mut threads = self.threads.lock().map_err(|_| poisoned())?;
        match threads.get(&thread.id.0) {
            Some(stored) if stored.version == expected_version => {
                threads.insert(thread.id.0.clone(), thread);
                Ok(())
            }
            Some(_) => Err(StoreError::VersionConflict(thread.id.clone())),
            None => Err(StoreError::VersionConflict(thread.id.clone())),
        }
    }

    async fn list(&self) -> Result<Vec<Thread>, StoreError> {
        let threads = self.threads.lock().map_err(|_| poisoned())?;
        let mut all: Vec<Thread> = threads.values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }
}
