//! Per-category bounded queues and their worker pools.
//!
//! Each category owns one [`WorkQueue`]: a bounded FIFO of scheduled
//! instances plus a fixed set of dedicated OS worker threads that drain it.
//! Every worker runs its own single-threaded tokio runtime so async `work()`
//! bodies never block the caller's runtime.
//!
//! # Design
//!
//! - **No polling**: submitters and workers block on `Condvar`s
//! - **Removable entries**: `CancelScheduled` and shutdown pull units out of
//!   the middle of the queue, so the FIFO is a `VecDeque`, not a channel
//! - **Re-enqueue ignores capacity**: a suspended unit goes back to the tail
//!   even when the queue is full, so a worker never blocks on its own queue

mod worker;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{OverflowPolicy, QueueConfig};
use crate::core::scheduler::Engine;
use crate::core::{SchedulerError, WorkInstance};

/// How a `work()` invocation ended, as seen by the worker.
pub(crate) enum WorkExit {
    /// Returned `Ok` without acknowledging a suspension.
    Completed,
    /// Returned `Err` or panicked.
    Failed(anyhow::Error),
    /// Acknowledged a suspend request and returned `Ok`.
    Suspended,
}

/// Statistics about one category queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Queue category.
    pub category: String,
    /// Number of worker threads.
    pub worker_count: usize,
    /// Maximum number of waiting units.
    pub capacity: usize,
    /// Units waiting in the queue right now.
    pub queued: u64,
    /// Units being executed right now.
    pub running: u64,
    /// Total units accepted into the queue (re-enqueues excluded).
    pub scheduled: u64,
    /// Total units that completed.
    pub completed: u64,
    /// Total units that failed.
    pub failed: u64,
    /// Total units canceled (dedup, rollback, cancel, overflow).
    pub canceled: u64,
    /// Total suspensions acknowledged.
    pub suspended: u64,
}

/// Internal counters for queue statistics.
#[derive(Debug, Default)]
pub(crate) struct QueueCounters {
    pub running: AtomicU64,
    pub scheduled: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub canceled: AtomicU64,
    pub suspended: AtomicU64,
}

impl QueueCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct Entries {
    items: VecDeque<WorkInstance>,
    closed: bool,
}

/// Queue state shared between the engine and the worker threads.
pub(crate) struct QueueInner {
    pub(crate) category: String,
    config: QueueConfig,
    entries: Mutex<Entries>,
    not_empty: Condvar,
    not_full: Condvar,
    pub(crate) counters: QueueCounters,
}

impl QueueInner {
    fn new(category: String, config: QueueConfig) -> Self {
        Self {
            category,
            entries: Mutex::new(Entries {
                items: VecDeque::with_capacity(config.capacity.min(1024)),
                closed: false,
            }),
            config,
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            counters: QueueCounters::default(),
        }
    }

    /// Append a freshly scheduled instance, honoring capacity and overflow.
    pub(crate) fn enqueue(&self, instance: WorkInstance) -> Result<(), SchedulerError> {
        self.enqueue_with(instance, self.config.overflow)
    }

    /// [`QueueInner::enqueue`] with an explicit overflow policy.
    pub(crate) fn enqueue_with(
        &self,
        instance: WorkInstance,
        overflow: OverflowPolicy,
    ) -> Result<(), SchedulerError> {
        let mut entries = self.entries.lock();
        loop {
            if entries.closed {
                return Err(SchedulerError::Shutdown);
            }
            if entries.items.len() < self.config.capacity {
                entries.items.push_back(instance);
                drop(entries);
                QueueCounters::bump(&self.counters.scheduled);
                self.not_empty.notify_one();
                return Ok(());
            }
            match overflow {
                OverflowPolicy::FailFast => {
                    return Err(SchedulerError::QueueFull(self.category.clone()));
                }
                OverflowPolicy::Block => {
                    debug!(category = %self.category, "queue full, submitter blocked");
                    self.not_full.wait(&mut entries);
                }
            }
        }
    }

    /// Put a suspended instance back at the tail. Gives it back if closed.
    pub(crate) fn requeue(&self, instance: WorkInstance) -> Result<(), WorkInstance> {
        let mut entries = self.entries.lock();
        if entries.closed {
            return Err(instance);
        }
        entries.items.push_back(instance);
        drop(entries);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Block until an instance is available. `None` once closed and empty.
    pub(crate) fn dequeue(&self) -> Option<WorkInstance> {
        let mut entries = self.entries.lock();
        loop {
            if let Some(instance) = entries.items.pop_front() {
                drop(entries);
                self.not_full.notify_one();
                return Some(instance);
            }
            if entries.closed {
                return None;
            }
            self.not_empty.wait(&mut entries);
        }
    }

    /// Remove the instance with sequence number `seq`, if still queued.
    pub(crate) fn remove(&self, seq: u64) -> Option<WorkInstance> {
        let mut entries = self.entries.lock();
        let pos = entries.items.iter().position(|i| i.record.seq == seq)?;
        let instance = entries.items.remove(pos);
        drop(entries);
        self.not_full.notify_one();
        instance
    }

    /// Take every queued instance.
    pub(crate) fn drain(&self) -> Vec<WorkInstance> {
        let drained: Vec<_> = self.entries.lock().items.drain(..).collect();
        self.not_full.notify_all();
        drained
    }

    /// Refuse further enqueues and wake everyone blocked on the queue.
    pub(crate) fn close(&self) {
        self.entries.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().items.len()
    }
}

/// One category queue with its dedicated worker threads.
pub struct WorkQueue {
    inner: Arc<QueueInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkQueue {
    pub(crate) fn new(category: impl Into<String>, config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(QueueInner::new(category.into(), config)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker threads. Each holds a reference to the engine.
    pub(crate) fn start(&self, engine: &Arc<Engine>) -> Result<(), SchedulerError> {
        let mut workers = self.workers.lock();
        for worker_id in 0..self.inner.config.worker_count {
            let handle = worker::spawn_worker(
                worker_id,
                Arc::clone(&self.inner),
                Arc::clone(engine),
                self.inner.config.thread_stack_size,
            )?;
            workers.push(handle);
        }
        debug!(
            category = %self.inner.category,
            worker_count = workers.len(),
            capacity = self.inner.config.capacity,
            "queue workers started"
        );
        Ok(())
    }

    pub(crate) fn inner(&self) -> &QueueInner {
        &self.inner
    }

    /// Queue category.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.inner.category
    }

    /// Maximum number of waiting units.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.config.capacity
    }

    /// Number of worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.inner.config.worker_count
    }

    /// Behaviour when full.
    #[must_use]
    pub fn overflow(&self) -> OverflowPolicy {
        self.inner.config.overflow
    }

    /// Units waiting right now.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get current queue statistics.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let counters = &self.inner.counters;
        QueueStats {
            category: self.inner.category.clone(),
            worker_count: self.inner.config.worker_count,
            capacity: self.inner.config.capacity,
            queued: self.len() as u64,
            running: counters.running.load(Ordering::Relaxed),
            scheduled: counters.scheduled.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            canceled: counters.canceled.load(Ordering::Relaxed),
            suspended: counters.suspended.load(Ordering::Relaxed),
        }
    }

    /// Join the workers, giving up at `deadline`. Returns `true` when every
    /// worker exited in time. Late workers are detached.
    pub(crate) fn join(&self, deadline: Instant) -> bool {
        let mut workers = self.workers.lock();
        let mut clean = true;

        for (idx, worker) in workers.drain(..).enumerate() {
            let (tx, rx) = crossbeam_channel::bounded(1);
            let joiner = thread::spawn(move || {
                let _ = tx.send(worker.join().is_ok());
            });

            match rx.recv_deadline(deadline) {
                Ok(true) => {
                    debug!(category = %self.inner.category, worker_id = idx, "worker joined");
                }
                Ok(false) => {
                    warn!(category = %self.inner.category, worker_id = idx, "worker thread panicked");
                }
                Err(_) => {
                    warn!(
                        category = %self.inner.category,
                        worker_id = idx,
                        "worker did not exit before deadline - detaching"
                    );
                    clean = false;
                    continue;
                }
            }
            let _ = joiner.join();
        }
        clean
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("category", &self.inner.category)
            .field("capacity", &self.inner.config.capacity)
            .field("worker_count", &self.inner.config.worker_count)
            .field("queued", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AppResult, SchedulePath, Work, WorkContext, WorkRecord};
    use async_trait::async_trait;

    struct Noop(&'static str);

    #[async_trait]
    impl Work for Noop {
        fn id(&self) -> &str {
            self.0
        }

        async fn work(&mut self, _ctx: &WorkContext) -> AppResult<()> {
            Ok(())
        }
    }

    fn instance(seq: u64) -> WorkInstance {
        let work: Box<dyn Work> = Box::new(Noop("n"));
        let record = WorkRecord::new(seq, work.as_ref(), "default".into(), SchedulePath::default(), 1);
        WorkInstance {
            record: Arc::new(record),
            work,
        }
    }

    fn queue(capacity: usize, overflow: OverflowPolicy) -> QueueInner {
        QueueInner::new(
            "default".into(),
            QueueConfig::new()
                .with_capacity(capacity)
                .with_worker_count(1)
                .with_overflow(overflow),
        )
    }

    #[test]
    fn test_fail_fast_rejects_when_full() {
        let q = queue(1, OverflowPolicy::FailFast);
        assert!(q.enqueue(instance(1)).is_ok());
        assert!(matches!(q.enqueue(instance(2)), Err(SchedulerError::QueueFull(_))));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_fail_fast_override_on_blocking_queue() {
        let q = queue(1, OverflowPolicy::Block);
        assert!(q.enqueue(instance(1)).is_ok());
        assert!(matches!(
            q.enqueue_with(instance(2), OverflowPolicy::FailFast),
            Err(SchedulerError::QueueFull(_))
        ));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_requeue_ignores_capacity() {
        let q = queue(1, OverflowPolicy::FailFast);
        assert!(q.enqueue(instance(1)).is_ok());
        assert!(q.requeue(instance(2)).is_ok());
        assert_eq!(q.len(), 2);
        assert_eq!(q.dequeue().map(|i| i.record.seq), Some(1));
        assert_eq!(q.dequeue().map(|i| i.record.seq), Some(2));
    }

    #[test]
    fn test_remove_from_middle() {
        let q = queue(8, OverflowPolicy::Block);
        for seq in 1..=3 {
            assert!(q.enqueue(instance(seq)).is_ok());
        }
        assert!(q.remove(2).is_some());
        assert!(q.remove(2).is_none());
        let order: Vec<_> = q.drain().into_iter().map(|i| i.record.seq).collect();
        assert_eq!(order, vec![1, 3]);
    }

    #[test]
    fn test_close_unblocks_and_rejects() {
        let q = Arc::new(queue(1, OverflowPolicy::Block));
        assert!(q.enqueue(instance(1)).is_ok());

        let blocked = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.enqueue(instance(2)))
        };
        thread::sleep(std::time::Duration::from_millis(50));
        q.close();

        assert!(matches!(blocked.join().unwrap(), Err(SchedulerError::Shutdown)));
        assert_eq!(q.dequeue().map(|i| i.record.seq), Some(1));
        assert!(q.dequeue().is_none());
        assert!(q.requeue(instance(3)).is_err());
    }
}
