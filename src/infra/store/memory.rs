//! In-memory work store.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{SchedulerError, WorkSnapshot, WorkStore};

/// Simple in-memory store for development/testing.
///
/// Clones share the same map, so a store handed to one scheduler can be
/// handed to the next one to resume what the first left behind. Survives
/// shutdown within a process, not a restart.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkStore {
    snapshots: Arc<Mutex<BTreeMap<String, WorkSnapshot>>>,
}

impl InMemoryWorkStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.lock().is_empty()
    }
}

impl WorkStore for InMemoryWorkStore {
    fn save(&mut self, snapshot: WorkSnapshot) -> Result<(), SchedulerError> {
        self.snapshots.lock().insert(snapshot.id.clone(), snapshot);
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<WorkSnapshot>, SchedulerError> {
        Ok(self.snapshots.lock().get(id).cloned())
    }

    fn remove(&mut self, id: &str) -> Result<bool, SchedulerError> {
        Ok(self.snapshots.lock().remove(id).is_some())
    }

    fn list_ids(&self) -> Result<Vec<String>, SchedulerError> {
        Ok(self.snapshots.lock().keys().cloned().collect())
    }
}
