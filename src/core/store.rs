//! Durable store contract and the work factory registry.
//!
//! A store keeps [`WorkSnapshot`]s of suspended or not-yet-run units so they
//! survive a shutdown. The [`WorkRegistry`] turns a snapshot back into a
//! fresh [`Work`] object carrying the same id and saved state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{AppResult, Progress, SchedulePath, SchedulerError, Work, WorkRecord};

/// Everything needed to rebuild and reschedule a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSnapshot {
    /// Work id (store key).
    pub id: String,
    /// Category the unit was routed to.
    pub category: String,
    /// Human-readable name.
    pub title: String,
    /// Factory discriminator.
    pub kind: String,
    /// Path captured at original scheduling time.
    pub schedule_path: SchedulePath,
    /// Last reported progress.
    pub progress: Progress,
    /// Original scheduling time (ms).
    pub scheduling_time: u64,
    /// Opaque resumable state returned by [`Work::save_state`].
    pub state: serde_json::Value,
}

impl WorkSnapshot {
    pub(crate) fn capture(record: &WorkRecord, work: &dyn Work) -> AppResult<Self> {
        let info = record.info();
        Ok(Self {
            id: info.id,
            category: info.category,
            title: info.title,
            kind: info.kind,
            schedule_path: info.schedule_path,
            progress: info.progress,
            scheduling_time: info.scheduling_time,
            state: work.save_state()?,
        })
    }
}

/// Abstraction for durable store backends.
pub trait WorkStore: Send {
    /// Persist (or overwrite) the snapshot for `snapshot.id`.
    fn save(&mut self, snapshot: WorkSnapshot) -> Result<(), SchedulerError>;
    /// Load a snapshot by id.
    fn load(&self, id: &str) -> Result<Option<WorkSnapshot>, SchedulerError>;
    /// Remove a snapshot; returns whether one existed.
    fn remove(&mut self, id: &str) -> Result<bool, SchedulerError>;
    /// Ids of all stored snapshots.
    fn list_ids(&self) -> Result<Vec<String>, SchedulerError>;
}

type WorkFactory = dyn Fn(&WorkSnapshot) -> AppResult<Box<dyn Work>> + Send + Sync;

/// Maps work kinds to factories that rebuild units from snapshots.
#[derive(Clone, Default)]
pub struct WorkRegistry {
    factories: HashMap<String, Arc<WorkFactory>>,
}

impl WorkRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `kind` (see [`Work::kind`]).
    pub fn register<F, W>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&WorkSnapshot) -> AppResult<W> + Send + Sync + 'static,
        W: Work,
    {
        let factory = move |snapshot: &WorkSnapshot| -> AppResult<Box<dyn Work>> {
            Ok(Box::new(factory(snapshot)?))
        };
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    /// Whether a factory exists for `kind`.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Rebuild a unit from its snapshot.
    ///
    /// # Errors
    ///
    /// `UnknownKind` when no factory is registered, `Store` when the factory
    /// rejects the snapshot or rebuilds a unit with a different id.
    pub fn restore(&self, snapshot: &WorkSnapshot) -> Result<Box<dyn Work>, SchedulerError> {
        let factory = self
            .factories
            .get(&snapshot.kind)
            .ok_or_else(|| SchedulerError::UnknownKind(snapshot.kind.clone()))?;
        let work = factory(snapshot)
            .map_err(|e| SchedulerError::Store(format!("restore `{}`: {e:#}", snapshot.id)))?;
        if work.id() != snapshot.id {
            return Err(SchedulerError::Store(format!(
                "restored `{}` under a different id `{}`",
                snapshot.id,
                work.id()
            )));
        }
        Ok(work)
    }
}

impl fmt::Debug for WorkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
