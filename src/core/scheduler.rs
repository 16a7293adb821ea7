//! The scheduler: routing, dedup policies, state tracking and lifecycle.
//!
//! [`Scheduler`] is the public facade; the shared [`Engine`] behind it is
//! also referenced by every worker thread and every [`WorkContext`], so
//! nested scheduling from inside a running unit goes through the same
//! bookkeeping as top-level calls.
//!
//! Lock order: state table, then a record's live state, a queue or the
//! store.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::config::{OverflowPolicy, RetentionConfig, SchedulerConfig};
use crate::core::sink::build_failure_record;
use crate::core::transaction::AfterCommit;
use crate::core::work_queue::{QueueCounters, QueueInner, WorkExit};
use crate::core::{
    FailureSink, PathEntry, QueueStats, SchedulePath, SchedulerError, SchedulingPolicy, Work,
    WorkHandle, WorkInfo, WorkInstance, WorkQueue, WorkRecord, WorkRegistry, WorkSnapshot,
    WorkState, WorkStore,
};
use crate::util::clock::now_ms;

/// Active and retained records.
#[derive(Default)]
struct StateTable {
    /// Scheduled or running instances by id, oldest first.
    active: HashMap<String, Vec<Arc<WorkRecord>>>,
    /// Non-terminal count per category.
    pending: HashMap<String, usize>,
    pending_total: usize,
    /// Latest terminal record per id.
    history: HashMap<String, Arc<WorkRecord>>,
    /// Retirement order, `(id, seq)`; may hold stale pairs.
    order: VecDeque<(String, u64)>,
}

impl StateTable {
    fn insert_active(&mut self, record: Arc<WorkRecord>) {
        *self.pending.entry(record.category.clone()).or_default() += 1;
        self.pending_total += 1;
        self.active.entry(record.id.clone()).or_default().push(record);
    }

    fn remove_active(&mut self, record: &WorkRecord) -> bool {
        let Some(list) = self.active.get_mut(&record.id) else {
            return false;
        };
        let Some(pos) = list.iter().position(|r| r.seq == record.seq) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            self.active.remove(&record.id);
        }
        if let Some(count) = self.pending.get_mut(&record.category) {
            *count = count.saturating_sub(1);
        }
        self.pending_total = self.pending_total.saturating_sub(1);
        true
    }

    fn retire(&mut self, record: Arc<WorkRecord>, retention: &RetentionConfig, now: u64) {
        self.order.push_back((record.id.clone(), record.seq));
        self.history.insert(record.id.clone(), record);
        self.evict(retention, now);
    }

    fn is_current(&self, id: &str, seq: u64) -> bool {
        self.history.get(id).is_some_and(|r| r.seq == seq)
    }

    fn evict(&mut self, retention: &RetentionConfig, now: u64) {
        while self.history.len() > retention.max_entries {
            let Some((id, seq)) = self.order.pop_front() else {
                break;
            };
            if self.is_current(&id, seq) {
                self.history.remove(&id);
            }
        }

        if let Some(ttl) = retention.ttl_ms {
            while let Some((id, seq)) = self.order.front() {
                let expired = match self.history.get(id) {
                    Some(r) if r.seq == *seq => now.saturating_sub(r.completion_time()) > ttl,
                    _ => true,
                };
                if !expired {
                    break;
                }
                if let Some((id, seq)) = self.order.pop_front() {
                    if self.is_current(&id, seq) {
                        self.history.remove(&id);
                    }
                }
            }
        }

        if self.order.len() > 2 * self.history.len() + 64 {
            let history = &self.history;
            self.order
                .retain(|(id, seq)| history.get(id).is_some_and(|r| r.seq == *seq));
        }
    }

    fn state_of(&self, id: &str) -> Option<WorkState> {
        if let Some(list) = self.active.get(id) {
            let states: Vec<_> = list.iter().map(|r| r.state()).collect();
            if states.contains(&WorkState::Running) {
                return Some(WorkState::Running);
            }
            if let Some(state) = states.first() {
                return Some(*state);
            }
        }
        self.history.get(id).map(|r| r.state())
    }

    fn all_records(&self) -> impl Iterator<Item = &Arc<WorkRecord>> {
        self.active.values().flatten().chain(self.history.values())
    }
}

/// Shared engine state.
pub(crate) struct Engine {
    config: SchedulerConfig,
    queues: HashMap<String, WorkQueue>,
    table: Mutex<StateTable>,
    completion: Condvar,
    store: Option<Mutex<Box<dyn WorkStore>>>,
    registry: WorkRegistry,
    sink: Arc<dyn FailureSink>,
    capture: AtomicBool,
    shutting_down: AtomicBool,
    /// Outcome of the first `shutdown` call, once it returned.
    shutdown_clean: Mutex<Option<bool>>,
    next_seq: AtomicU64,
}

impl Engine {
    pub(crate) fn new(
        config: SchedulerConfig,
        store: Option<Box<dyn WorkStore>>,
        sink: Arc<dyn FailureSink>,
        registry: WorkRegistry,
    ) -> Self {
        let queues = config
            .queues
            .iter()
            .map(|(category, queue)| (category.clone(), WorkQueue::new(category.clone(), queue.clone())))
            .collect();
        Self {
            capture: AtomicBool::new(config.capture_schedule_stack),
            config,
            queues,
            table: Mutex::new(StateTable::default()),
            completion: Condvar::new(),
            store: store.map(Mutex::new),
            registry,
            sink,
            shutting_down: AtomicBool::new(false),
            shutdown_clean: Mutex::new(None),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Spawn every queue's workers.
    pub(crate) fn start(self: &Arc<Self>) -> Result<(), SchedulerError> {
        for queue in self.queues.values() {
            queue.start(self)?;
        }
        Ok(())
    }

    fn queue(&self, category: &str) -> Result<&WorkQueue, SchedulerError> {
        self.queues
            .get(category)
            .ok_or_else(|| SchedulerError::UnknownCategory(category.to_string()))
    }

    fn counters(&self, category: &str) -> Option<&QueueCounters> {
        self.queues.get(category).map(|q| &q.inner().counters)
    }

    /// Build the engine record for a fresh unit, capturing its path.
    pub(crate) fn prepare(
        &self,
        work: Box<dyn Work>,
        parent: Option<&SchedulePath>,
    ) -> Result<WorkInstance, SchedulerError> {
        let category = work
            .category()
            .map_or_else(|| self.config.default_category.clone(), str::to_string);
        self.queue(&category)?;

        let schedule_path = if self.capture.load(Ordering::Acquire) {
            let entry = PathEntry::new(work.id(), category.as_str(), work.title());
            match parent {
                Some(parent) if !parent.is_empty() => parent.extend(entry),
                _ => SchedulePath::root(entry),
            }
        } else {
            SchedulePath::default()
        };

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let record = WorkRecord::new(seq, work.as_ref(), category, schedule_path, now_ms());
        Ok(WorkInstance {
            record: Arc::new(record),
            work,
        })
    }

    /// Prepare and submit in one step. `parent` is the running unit when
    /// scheduling from inside `work()`.
    ///
    /// A nested unit routed to its parent's own queue never blocks on a full
    /// queue: the parent holds one of that queue's workers.
    pub(crate) fn schedule_boxed(
        &self,
        work: Box<dyn Work>,
        policy: SchedulingPolicy,
        parent: Option<&WorkRecord>,
    ) -> Result<WorkHandle, SchedulerError> {
        if self.is_shutting_down() {
            return Err(SchedulerError::Shutdown);
        }
        let instance = self.prepare(work, parent.map(|p| &p.schedule_path))?;
        let overflow = parent
            .filter(|p| p.category == instance.record.category)
            .map(|_| OverflowPolicy::FailFast);
        self.submit_with(instance, policy, overflow)
    }

    /// Apply `policy` against active units with the same id, then enqueue
    /// with the queue's own overflow policy.
    pub(crate) fn submit(
        &self,
        instance: WorkInstance,
        policy: SchedulingPolicy,
    ) -> Result<WorkHandle, SchedulerError> {
        self.submit_with(instance, policy, None)
    }

    /// Apply `policy` against active units with the same id, then enqueue,
    /// overriding the queue's overflow policy when `overflow` is set.
    ///
    /// A unit rejected by its policy is returned as a `Canceled` handle,
    /// not as an error.
    fn submit_with(
        &self,
        instance: WorkInstance,
        policy: SchedulingPolicy,
        overflow: Option<OverflowPolicy>,
    ) -> Result<WorkHandle, SchedulerError> {
        let record = Arc::clone(&instance.record);
        let handle = instance.handle();
        if self.is_shutting_down() {
            self.cancel_unsubmitted(&record);
            return Err(SchedulerError::Shutdown);
        }
        let queue = self.queue(&record.category)?;

        {
            let mut table = self.table.lock();
            let (scheduled, running) = table.active.get(&record.id).map_or((false, false), |list| {
                let states: Vec<_> = list.iter().map(|r| r.state()).collect();
                (
                    states.contains(&WorkState::Scheduled),
                    states.contains(&WorkState::Running),
                )
            });
            let rejected = match policy {
                SchedulingPolicy::Always | SchedulingPolicy::CancelScheduled => false,
                SchedulingPolicy::IfNotScheduled => scheduled,
                SchedulingPolicy::IfNotRunning => running,
                SchedulingPolicy::IfNotRunningOrScheduled => scheduled || running,
            };
            if rejected {
                let now = now_ms();
                record.transition(WorkState::Canceled, now);
                table.retire(Arc::clone(&record), &self.config.retention, now);
                QueueCounters::bump(&queue.inner().counters.canceled);
                debug!(work_id = %record.id, ?policy, "work canceled by scheduling policy");
                return Ok(handle);
            }

            if policy == SchedulingPolicy::CancelScheduled {
                let superseded: Vec<_> = table
                    .active
                    .get(&record.id)
                    .map(|list| {
                        list.iter()
                            .filter(|r| r.state() == WorkState::Scheduled)
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                for old in &superseded {
                    if self.cancel_locked(&mut table, old) {
                        debug!(work_id = %old.id, seq = old.seq, "scheduled work superseded");
                    }
                }
            }
            table.insert_active(Arc::clone(&record));
        }

        let overflow = overflow.unwrap_or_else(|| queue.overflow());
        match queue.inner().enqueue_with(instance, overflow) {
            Ok(()) => {
                debug!(
                    work_id = %record.id,
                    category = %record.category,
                    seq = record.seq,
                    ?policy,
                    "work scheduled"
                );
                Ok(handle)
            }
            Err(e) => {
                warn!(work_id = %record.id, category = %record.category, error = %e, "work not enqueued");
                let mut table = self.table.lock();
                if table.remove_active(&record) {
                    let now = now_ms();
                    record.transition(WorkState::Canceled, now);
                    table.retire(Arc::clone(&record), &self.config.retention, now);
                    QueueCounters::bump(&queue.inner().counters.canceled);
                }
                drop(table);
                self.completion.notify_all();
                Err(e)
            }
        }
    }

    /// Cancel a scheduled record while holding the table lock.
    fn cancel_locked(&self, table: &mut StateTable, record: &Arc<WorkRecord>) -> bool {
        let now = now_ms();
        if !record.transition(WorkState::Canceled, now) {
            return false;
        }
        table.remove_active(record);
        table.retire(Arc::clone(record), &self.config.retention, now);
        if let Some(queue) = self.queues.get(&record.category) {
            let _ = queue.inner().remove(record.seq);
            QueueCounters::bump(&queue.inner().counters.canceled);
        }
        self.completion.notify_all();
        true
    }

    /// Cancel a record that never reached a queue.
    pub(crate) fn cancel_unsubmitted(&self, record: &Arc<WorkRecord>) {
        let now = now_ms();
        if record.transition(WorkState::Canceled, now) {
            self.table
                .lock()
                .retire(Arc::clone(record), &self.config.retention, now);
            if let Some(counters) = self.counters(&record.category) {
                QueueCounters::bump(&counters.canceled);
            }
        }
    }

    /// `Scheduled -> Running`. `false` when the unit was canceled meanwhile.
    pub(crate) fn begin_run(&self, record: &WorkRecord) -> bool {
        let started = record.transition(WorkState::Running, now_ms());
        if started {
            debug!(work_id = %record.id, seq = record.seq, "work running");
        }
        started
    }

    /// Apply the outcome of one `work()` invocation.
    pub(crate) fn finish(&self, queue: &QueueInner, instance: WorkInstance, exit: WorkExit) {
        let record = Arc::clone(&instance.record);
        match exit {
            WorkExit::Completed => {
                self.retire_terminal(&record, WorkState::Completed, now_ms());
                QueueCounters::bump(&queue.counters.completed);
                debug!(work_id = %record.id, seq = record.seq, "work completed");
            }
            WorkExit::Failed(error) => {
                let now = now_ms();
                let message = format!("{error:#}");
                record.set_error(message.clone());
                let mut info = record.info();
                info.state = WorkState::Failed;
                info.completion_time = now;
                self.sink.record(&build_failure_record(info, error));
                self.retire_terminal(&record, WorkState::Failed, now);
                QueueCounters::bump(&queue.counters.failed);
                debug!(work_id = %record.id, seq = record.seq, error = %message, "work failed");
            }
            WorkExit::Suspended => {
                record.transition(WorkState::Scheduled, now_ms());
                record.clear_suspend_flags();
                QueueCounters::bump(&queue.counters.suspended);
                let persisted = self.persist(&instance);

                if self.is_shutting_down() {
                    self.park(instance, persisted);
                    return;
                }
                match queue.requeue(instance) {
                    Ok(()) => debug!(work_id = %record.id, "work suspended and re-enqueued"),
                    Err(instance) => self.park(instance, persisted),
                }
            }
        }
    }

    fn retire_terminal(&self, record: &Arc<WorkRecord>, state: WorkState, now: u64) {
        let mut table = self.table.lock();
        table.remove_active(record);
        // Drop the snapshot before anyone can observe the terminal state
        if !table.active.contains_key(&record.id) {
            self.forget(&record.id);
        }
        record.transition(state, now);
        table.retire(Arc::clone(record), &self.config.retention, now);
        drop(table);
        self.completion.notify_all();
    }

    /// Save the resumable state of `instance` in the store, if any.
    fn persist(&self, instance: &WorkInstance) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        let snapshot = match WorkSnapshot::capture(&instance.record, instance.work.as_ref()) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(work_id = %instance.record.id, error = %e, "could not capture work state");
                return false;
            }
        };
        match store.lock().save(snapshot) {
            Ok(()) => {
                debug!(work_id = %instance.record.id, "work state persisted");
                true
            }
            Err(e) => {
                warn!(work_id = %instance.record.id, error = %e, "could not persist work state");
                false
            }
        }
    }

    fn forget(&self, id: &str) {
        if let Some(store) = &self.store {
            if let Err(e) = store.lock().remove(id) {
                warn!(work_id = %id, error = %e, "could not remove persisted work state");
            }
        }
    }

    /// Take a scheduled instance out of this engine during shutdown: keep
    /// it in the store when possible, otherwise cancel it.
    fn park(&self, instance: WorkInstance, persisted: bool) {
        let record = Arc::clone(&instance.record);
        if record.state() != WorkState::Scheduled {
            return;
        }
        if persisted || self.persist(&instance) {
            self.table.lock().remove_active(&record);
            self.completion.notify_all();
            debug!(work_id = %record.id, "work parked in store");
        } else {
            let mut table = self.table.lock();
            if self.cancel_locked(&mut table, &record) {
                warn!(work_id = %record.id, "scheduled work canceled at shutdown");
            }
        }
    }

    pub(crate) fn cancel(&self, id: &str) -> usize {
        let mut table = self.table.lock();
        let scheduled: Vec<_> = table
            .active
            .get(id)
            .map(|list| {
                list.iter()
                    .filter(|r| r.state() == WorkState::Scheduled)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        let canceled = scheduled
            .iter()
            .filter(|r| self.cancel_locked(&mut table, r))
            .count();
        if canceled > 0 && !table.active.contains_key(id) {
            self.forget(id);
        }
        canceled
    }

    pub(crate) fn request_suspend(&self, id: Option<&str>) -> usize {
        let table = self.table.lock();
        let mut requested = 0;
        for record in table.active.values().flatten() {
            if id.is_some_and(|id| id != record.id) {
                continue;
            }
            if record.state() == WorkState::Running {
                record.request_suspend();
                requested += 1;
            }
        }
        requested
    }

    pub(crate) fn await_pending(&self, category: Option<&str>, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut table = self.table.lock();
        loop {
            let pending = match category {
                None => table.pending_total,
                Some(category) => table.pending.get(category).copied().unwrap_or(0),
            };
            if pending == 0 {
                return true;
            }
            if self.completion.wait_until(&mut table, deadline).timed_out() {
                let pending = match category {
                    None => table.pending_total,
                    Some(category) => table.pending.get(category).copied().unwrap_or(0),
                };
                return pending == 0;
            }
        }
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    fn close_queues(&self) {
        for queue in self.queues.values() {
            queue.inner().close();
        }
    }
}

/// Asynchronous work scheduler with per-category queues.
///
/// Dropping a scheduler without calling [`Scheduler::shutdown`] closes the
/// queues and detaches the workers; they finish what is already queued.
pub struct Scheduler {
    engine: Arc<Engine>,
}

impl Scheduler {
    pub(crate) const fn from_engine(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Build and start a scheduler with no store and a logging failure sink.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for invalid configuration, `Internal` when worker
    /// threads cannot be spawned.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        crate::builders::SchedulerBuilder::new(config).build()
    }

    /// Configuration this scheduler was built with.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.engine.config
    }

    /// Schedule a unit under `policy`.
    ///
    /// The returned handle observes this instance; when the policy rejects
    /// it the handle is already `Canceled`.
    ///
    /// # Errors
    ///
    /// - `UnknownCategory` if no queue serves the unit's category
    /// - `QueueFull` if the queue is full and fails fast
    /// - `Shutdown` after shutdown started
    pub fn schedule<W: Work>(
        &self,
        work: W,
        policy: SchedulingPolicy,
    ) -> Result<WorkHandle, SchedulerError> {
        self.schedule_boxed(Box::new(work), policy)
    }

    /// Schedule a unit with [`SchedulingPolicy::Always`].
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::schedule`].
    pub fn schedule_default<W: Work>(&self, work: W) -> Result<WorkHandle, SchedulerError> {
        self.schedule(work, SchedulingPolicy::Always)
    }

    /// Schedule an already boxed unit.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::schedule`].
    pub fn schedule_boxed(
        &self,
        work: Box<dyn Work>,
        policy: SchedulingPolicy,
    ) -> Result<WorkHandle, SchedulerError> {
        self.engine.schedule_boxed(work, policy, None)
    }

    /// Start an after-commit batch: units are scheduled when the batch
    /// commits and canceled, never run, when it rolls back or is dropped.
    #[must_use]
    pub fn begin(&self) -> AfterCommit<'_> {
        AfterCommit::new(&self.engine)
    }

    /// Cancel every scheduled (not running) instance with `id`. Returns how
    /// many were canceled.
    pub fn cancel(&self, id: &str) -> usize {
        let canceled = self.engine.cancel(id);
        if canceled > 0 {
            info!(work_id = %id, canceled, "work canceled");
        }
        canceled
    }

    /// Ask every running instance with `id` to suspend. Returns how many
    /// were asked. Units that never check [`crate::core::WorkContext::is_suspending`]
    /// just run to completion.
    pub fn suspend(&self, id: &str) -> usize {
        self.engine.request_suspend(Some(id))
    }

    /// State of the unit with `id`: `Running` if any instance runs, else the
    /// oldest scheduled instance, else the latest retained terminal state.
    /// `None` when unknown or evicted.
    #[must_use]
    pub fn get_work_state(&self, id: &str) -> Option<WorkState> {
        let mut table = self.engine.table.lock();
        table.evict(&self.engine.config.retention, now_ms());
        table.state_of(id)
    }

    /// Snapshot of the most relevant instance with `id` (same precedence as
    /// [`Scheduler::get_work_state`]).
    #[must_use]
    pub fn find(&self, id: &str) -> Option<WorkInfo> {
        let mut table = self.engine.table.lock();
        table.evict(&self.engine.config.retention, now_ms());
        let record = table
            .active
            .get(id)
            .and_then(|list| {
                list.iter()
                    .find(|r| r.state() == WorkState::Running)
                    .or_else(|| list.first())
            })
            .or_else(|| table.history.get(id))?;
        Some(record.info())
    }

    /// Snapshots of known units in `category`, optionally filtered by state.
    /// Ordered by scheduling sequence.
    #[must_use]
    pub fn list_work(&self, category: &str, state: Option<WorkState>) -> Vec<WorkInfo> {
        let mut table = self.engine.table.lock();
        table.evict(&self.engine.config.retention, now_ms());
        let mut records: Vec<_> = table
            .all_records()
            .filter(|r| r.category == category)
            .filter(|r| state.is_none_or(|s| r.state() == s))
            .cloned()
            .collect();
        drop(table);
        records.sort_by_key(|r| r.seq);
        records.iter().map(|r| r.info()).collect()
    }

    /// Number of instances in `category` currently in `state`
    /// (`Scheduled` or `Running`; terminal states count retained records).
    #[must_use]
    pub fn queue_size(&self, category: &str, state: WorkState) -> usize {
        let mut table = self.engine.table.lock();
        table.evict(&self.engine.config.retention, now_ms());
        table
            .all_records()
            .filter(|r| r.category == category && r.state() == state)
            .count()
    }

    /// Number of scheduled or running instances in `category`.
    #[must_use]
    pub fn non_completed_work_size(&self, category: &str) -> usize {
        self.engine
            .table
            .lock()
            .pending
            .get(category)
            .copied()
            .unwrap_or(0)
    }

    /// Configured categories, sorted.
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<_> = self.engine.queues.keys().cloned().collect();
        categories.sort();
        categories
    }

    /// The queue serving `category`.
    #[must_use]
    pub fn queue(&self, category: &str) -> Option<&WorkQueue> {
        self.engine.queues.get(category)
    }

    /// Statistics of the queue serving `category`.
    #[must_use]
    pub fn stats(&self, category: &str) -> Option<QueueStats> {
        self.queue(category).map(WorkQueue::stats)
    }

    /// Block until no unit is scheduled or running, or `timeout` elapses.
    /// Returns whether everything completed.
    #[must_use]
    pub fn await_completion(&self, timeout: Duration) -> bool {
        self.engine.await_pending(None, timeout)
    }

    /// Like [`Scheduler::await_completion`], for one category.
    #[must_use]
    pub fn await_category_completion(&self, category: &str, timeout: Duration) -> bool {
        self.engine.await_pending(Some(category), timeout)
    }

    /// Async variant of [`Scheduler::await_completion`]; the wait runs on
    /// tokio's blocking pool.
    pub async fn await_completion_async(&self, timeout: Duration) -> bool {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || engine.await_pending(None, timeout))
            .await
            .unwrap_or(false)
    }

    /// Forget retained terminal records that completed before
    /// `completed_before_ms`; `0` forgets all of them. Returns how many.
    pub fn clear_completed(&self, completed_before_ms: u64) -> usize {
        let mut table = self.engine.table.lock();
        let before = table.history.len();
        if completed_before_ms == 0 {
            table.history.clear();
            table.order.clear();
        } else {
            table
                .history
                .retain(|_, r| r.completion_time() >= completed_before_ms);
            let StateTable { history, order, .. } = &mut *table;
            order.retain(|(id, seq)| history.get(id).is_some_and(|r| r.seq == *seq));
        }
        before - table.history.len()
    }

    /// Toggle schedule path capture for subsequent `schedule` calls.
    /// Returns the previous setting.
    pub fn capture_schedule_stack(&self, enabled: bool) -> bool {
        self.engine.capture.swap(enabled, Ordering::AcqRel)
    }

    /// Whether schedule paths are being captured.
    #[must_use]
    pub fn is_capturing_schedule_stack(&self) -> bool {
        self.engine.capture.load(Ordering::Acquire)
    }

    /// Ids of units kept in the durable store.
    ///
    /// # Errors
    ///
    /// `Store` when the backend fails. Empty without a store.
    pub fn persisted_ids(&self) -> Result<Vec<String>, SchedulerError> {
        match &self.engine.store {
            Some(store) => store.lock().list_ids(),
            None => Ok(Vec::new()),
        }
    }

    /// Rebuild the persisted unit `id` through the registry and schedule it
    /// again with its original path and scheduling time. `Ok(None)` when no
    /// store is configured or nothing is stored under `id`.
    ///
    /// # Errors
    ///
    /// - `UnknownKind` when no factory is registered for the unit's kind
    /// - `Store` on backend or factory failure
    /// - any error of [`Scheduler::schedule`]
    pub fn resume(&self, id: &str) -> Result<Option<WorkHandle>, SchedulerError> {
        let engine = &self.engine;
        let Some(store) = &engine.store else {
            return Ok(None);
        };
        let Some(snapshot) = store.lock().load(id)? else {
            return Ok(None);
        };
        if engine.is_shutting_down() {
            return Err(SchedulerError::Shutdown);
        }

        let work = engine.registry.restore(&snapshot)?;
        engine.queue(&snapshot.category)?;
        let seq = engine.next_seq.fetch_add(1, Ordering::Relaxed);
        let record = WorkRecord::new(
            seq,
            work.as_ref(),
            snapshot.category.clone(),
            snapshot.schedule_path.clone(),
            snapshot.scheduling_time,
        );
        record.set_progress(snapshot.progress);
        let instance = WorkInstance {
            record: Arc::new(record),
            work,
        };

        let handle = engine.submit(instance, SchedulingPolicy::IfNotRunningOrScheduled)?;
        info!(work_id = %id, state = %handle.state(), "persisted work resumed");
        Ok(Some(handle))
    }

    /// Resume every persisted unit. Stops at the first error.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::resume`].
    pub fn resume_persisted(&self) -> Result<Vec<WorkHandle>, SchedulerError> {
        let mut handles = Vec::new();
        for id in self.persisted_ids()? {
            if let Some(handle) = self.resume(&id)? {
                handles.push(handle);
            }
        }
        Ok(handles)
    }

    /// Whether shutdown started.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.engine.is_shutting_down()
    }

    /// Shut down: stop accepting work, persist (or cancel) queued units, ask
    /// running units to suspend, then join the workers until `timeout`.
    /// Returns `true` when every worker exited in time.
    ///
    /// Later calls return the first call's result, or `false` while the
    /// first call is still joining.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let engine = &self.engine;
        if engine.shutting_down.swap(true, Ordering::AcqRel) {
            return (*engine.shutdown_clean.lock()).unwrap_or(false);
        }
        let deadline = Instant::now() + timeout;
        info!(timeout_ms = timeout.as_millis() as u64, "shutting down scheduler");

        // Closing first fails blocked submitters instead of letting them
        // into the slots freed by the drain.
        engine.close_queues();
        for queue in engine.queues.values() {
            for instance in queue.inner().drain() {
                engine.park(instance, false);
            }
        }
        let suspending = engine.request_suspend(None);

        let mut clean = true;
        for queue in engine.queues.values() {
            clean &= queue.join(deadline);
        }
        *engine.shutdown_clean.lock() = Some(clean);
        info!(suspending, clean, "scheduler shut down");
        clean
    }

    /// [`Scheduler::shutdown`] with the configured default timeout.
    pub fn shutdown_default(&self) -> bool {
        self.shutdown(self.engine.config.shutdown_timeout())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Signal shutdown but don't join: explicit shutdown() joins
        if !self.engine.shutting_down.swap(true, Ordering::AcqRel) {
            self.engine.close_queues();
            debug!("scheduler dropped without explicit shutdown - workers will be detached");
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("categories", &self.categories())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
