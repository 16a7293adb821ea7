//! After-commit scheduling batches.
//!
//! Units added to an [`AfterCommit`] batch get their handle immediately but
//! only reach a queue when the batch commits. A rollback, or dropping the
//! batch without committing, cancels them without ever calling `work()`.

use std::sync::Arc;

use tracing::debug;

use crate::core::scheduler::Engine;
use crate::core::{SchedulerError, SchedulingPolicy, Work, WorkHandle, WorkInstance};

/// Pending units deferred until [`AfterCommit::commit`].
#[must_use = "an after-commit batch rolls back when dropped"]
pub struct AfterCommit<'a> {
    engine: &'a Arc<Engine>,
    pending: Vec<(WorkInstance, SchedulingPolicy)>,
}

impl<'a> AfterCommit<'a> {
    pub(crate) const fn new(engine: &'a Arc<Engine>) -> Self {
        Self {
            engine,
            pending: Vec::new(),
        }
    }

    /// Defer `work` until commit. The handle stays `Scheduled` until then.
    ///
    /// # Errors
    ///
    /// `UnknownCategory` if no queue serves the unit's category, `Shutdown`
    /// after shutdown started.
    pub fn schedule<W: Work>(
        &mut self,
        work: W,
        policy: SchedulingPolicy,
    ) -> Result<WorkHandle, SchedulerError> {
        if self.engine.is_shutting_down() {
            return Err(SchedulerError::Shutdown);
        }
        let instance = self.engine.prepare(Box::new(work), None)?;
        let handle = instance.handle();
        self.pending.push((instance, policy));
        Ok(handle)
    }

    /// Number of deferred units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing was deferred.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Submit every deferred unit in order. One result per unit; a failed
    /// submission does not stop the others.
    pub fn commit(mut self) -> Vec<Result<WorkHandle, SchedulerError>> {
        let pending = std::mem::take(&mut self.pending);
        debug!(count = pending.len(), "committing after-commit batch");
        pending
            .into_iter()
            .map(|(instance, policy)| self.engine.submit(instance, policy))
            .collect()
    }

    /// Cancel every deferred unit.
    pub fn rollback(mut self) {
        self.cancel_pending();
    }

    fn cancel_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        debug!(count = self.pending.len(), "rolling back after-commit batch");
        for (instance, _) in self.pending.drain(..) {
            self.engine.cancel_unsubmitted(&instance.record);
        }
    }
}

impl Drop for AfterCommit<'_> {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

impl std::fmt::Debug for AfterCommit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AfterCommit")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
