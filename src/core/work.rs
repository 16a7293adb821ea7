//! The unit-of-work contract.
//!
//! User code implements [`Work`], a pure capability: identity, the async
//! `work()` body and a few informational accessors. Everything the engine
//! mutates (state, timestamps, suspend flags) lives in an engine-owned
//! [`WorkRecord`] that callers only ever observe through [`WorkHandle`] and
//! [`WorkInfo`]. Running work talks back to the engine through a
//! [`WorkContext`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::core::scheduler::Engine;
use crate::core::{AppResult, Progress, SchedulePath, SchedulerError};

/// Lifecycle state of a unit of work.
///
/// ```text
/// Scheduled -> Running      dequeued by a worker
/// Scheduled -> Canceled     dedup rejection, rollback, superseded, cancel()
/// Running   -> Completed    work() returned Ok
/// Running   -> Failed       work() returned Err or panicked
/// Running   -> Scheduled    suspension acknowledged, re-enqueued
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkState {
    /// Waiting in a queue for a worker.
    Scheduled,
    /// Never ran and never will. Terminal.
    Canceled,
    /// A worker is executing `work()`.
    Running,
    /// `work()` returned normally. Terminal.
    Completed,
    /// `work()` returned an error or panicked. Terminal.
    Failed,
}

impl WorkState {
    /// Whether `self -> to` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Scheduled, Self::Running | Self::Canceled)
                | (Self::Running, Self::Completed | Self::Failed | Self::Scheduled)
        )
    }

    /// Completed, failed or canceled: no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Completed | Self::Failed)
    }

    /// Scheduled or running: counts against the identity dedup policies.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Scheduled | Self::Running)
    }
}

impl fmt::Display for WorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scheduled => "scheduled",
            Self::Canceled => "canceled",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// How `schedule` resolves a conflict with active units sharing the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Enqueue unconditionally; several active copies may coexist.
    #[default]
    Always,
    /// Cancel the new unit if one with the same id is scheduled.
    IfNotScheduled,
    /// Cancel the new unit if one with the same id is running.
    IfNotRunning,
    /// Cancel the new unit if one with the same id is scheduled or running.
    IfNotRunningOrScheduled,
    /// Cancel any scheduled unit with the same id, then enqueue the new one.
    CancelScheduled,
}

/// Reference to a document a unit acts on. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Repository holding the document.
    pub repository: String,
    /// Document id within the repository.
    pub id: String,
}

impl DocumentRef {
    /// Build a document reference.
    pub fn new(repository: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            id: id.into(),
        }
    }
}

/// Generate a fresh random work id.
#[must_use]
pub fn new_work_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A schedulable, resumable unit of work.
///
/// Only [`Work::id`] and [`Work::work`] are required. Long-running
/// implementations should check [`WorkContext::is_suspending`] at granular
/// boundaries; when it is set, they save whatever [`Work::save_state`] needs,
/// call [`WorkContext::suspended`] and return `Ok(())`.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use workq_engine::core::{AppResult, Progress, Work, WorkContext};
///
/// struct Reindex {
///     id: String,
///     done: u64,
///     total: u64,
/// }
///
/// #[async_trait]
/// impl Work for Reindex {
///     fn id(&self) -> &str {
///         &self.id
///     }
///
///     async fn work(&mut self, ctx: &WorkContext) -> AppResult<()> {
///         while self.done < self.total {
///             if ctx.is_suspending() {
///                 ctx.suspended();
///                 return Ok(());
///             }
///             self.done += 1;
///             ctx.set_progress(Progress::count(self.done, self.total));
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Work: Send + 'static {
    /// Identity used for dedup policies and as the durable-store key.
    fn id(&self) -> &str;

    /// Queue category; `None` selects the default queue.
    fn category(&self) -> Option<&str> {
        None
    }

    /// Persistence discriminator used to find the factory that rebuilds a
    /// suspended unit. Defaults to the Rust type name.
    fn kind(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Human-readable name.
    fn title(&self) -> String {
        let kind = self.kind();
        kind.rsplit("::").next().unwrap_or(kind).to_string()
    }

    /// The actual work.
    async fn work(&mut self, ctx: &WorkContext) -> AppResult<()>;

    /// Called exactly once after each `work()` invocation, on every exit path
    /// (completion, failure, panic, suspension). `ok` is `true` when `work()`
    /// returned `Ok`.
    fn clean_up(&mut self, _ok: bool, _error: Option<&anyhow::Error>) {}

    /// User on whose behalf the work runs.
    fn user_id(&self) -> Option<String> {
        None
    }

    /// The single document this unit acts on, if any.
    fn document(&self) -> Option<DocumentRef> {
        None
    }

    /// All documents this unit acts on.
    fn documents(&self) -> Vec<DocumentRef> {
        self.document().into_iter().collect()
    }

    /// Whether [`Work::document`] is only the root of an impacted tree.
    fn is_document_tree(&self) -> bool {
        false
    }

    /// State needed to resume after suspension or restart.
    fn save_state(&self) -> AppResult<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }
}

/// Mutable part of a [`WorkRecord`].
#[derive(Debug)]
struct LiveState {
    state: WorkState,
    progress: Progress,
    status: String,
    start_time: u64,
    completion_time: u64,
    error: Option<String>,
}

/// Engine-owned record of one scheduled instance.
///
/// Identity fields are captured from the [`Work`] at scheduling time and never
/// change; the live part is mutated only by the engine (state, timestamps)
/// and by the running unit through its [`WorkContext`] (progress, status).
#[derive(Debug)]
pub(crate) struct WorkRecord {
    pub(crate) seq: u64,
    pub(crate) id: String,
    pub(crate) category: String,
    pub(crate) title: String,
    pub(crate) kind: String,
    pub(crate) user_id: Option<String>,
    pub(crate) documents: Vec<DocumentRef>,
    pub(crate) document_tree: bool,
    pub(crate) schedule_path: SchedulePath,
    pub(crate) scheduling_time: u64,
    live: Mutex<LiveState>,
    changed: Condvar,
    suspending: AtomicBool,
    suspended: AtomicBool,
}

impl WorkRecord {
    pub(crate) fn new(
        seq: u64,
        work: &dyn Work,
        category: String,
        schedule_path: SchedulePath,
        scheduling_time: u64,
    ) -> Self {
        Self {
            seq,
            id: work.id().to_string(),
            category,
            title: work.title(),
            kind: work.kind().to_string(),
            user_id: work.user_id(),
            documents: work.documents(),
            document_tree: work.is_document_tree(),
            schedule_path,
            scheduling_time,
            live: Mutex::new(LiveState {
                state: WorkState::Scheduled,
                progress: Progress::INDETERMINATE,
                status: String::new(),
                start_time: 0,
                completion_time: 0,
                error: None,
            }),
            changed: Condvar::new(),
            suspending: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> WorkState {
        self.live.lock().state
    }

    /// Apply `self.state -> to` at time `now`. Returns `false` (and changes
    /// nothing) when the transition is illegal.
    pub(crate) fn transition(&self, to: WorkState, now: u64) -> bool {
        let mut live = self.live.lock();
        if !live.state.can_transition_to(to) {
            return false;
        }
        if to == WorkState::Running {
            if live.start_time == 0 {
                live.start_time = now;
            }
        } else {
            // Terminal, or back to Scheduled after an acknowledged suspension
            live.completion_time = now;
        }
        live.state = to;
        drop(live);
        self.changed.notify_all();
        true
    }

    pub(crate) fn set_error(&self, error: String) {
        self.live.lock().error = Some(error);
    }

    pub(crate) fn set_progress(&self, progress: Progress) {
        self.live.lock().progress = progress;
    }

    pub(crate) fn request_suspend(&self) {
        self.suspending.store(true, Ordering::Release);
    }

    pub(crate) fn is_suspending(&self) -> bool {
        self.suspending.load(Ordering::Acquire)
    }

    pub(crate) fn acknowledge_suspended(&self) {
        self.suspended.store(true, Ordering::Release);
    }

    pub(crate) fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire)
    }

    pub(crate) fn clear_suspend_flags(&self) {
        self.suspending.store(false, Ordering::Release);
        self.suspended.store(false, Ordering::Release);
    }

    pub(crate) fn completion_time(&self) -> u64 {
        self.live.lock().completion_time
    }

    pub(crate) fn info(&self) -> WorkInfo {
        let live = self.live.lock();
        WorkInfo {
            id: self.id.clone(),
            category: self.category.clone(),
            title: self.title.clone(),
            kind: self.kind.clone(),
            state: live.state,
            progress: live.progress,
            status: live.status.clone(),
            user_id: self.user_id.clone(),
            documents: self.documents.clone(),
            document_tree: self.document_tree,
            schedule_path: self.schedule_path.clone(),
            scheduling_time: self.scheduling_time,
            start_time: live.start_time,
            completion_time: live.completion_time,
            error: live.error.clone(),
        }
    }
}

/// Serializable snapshot of a unit's engine-owned record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkInfo {
    /// Work id.
    pub id: String,
    /// Category (queue) the unit was routed to.
    pub category: String,
    /// Human-readable name.
    pub title: String,
    /// Persistence discriminator.
    pub kind: String,
    /// Current state.
    pub state: WorkState,
    /// Last reported progress.
    pub progress: Progress,
    /// Last reported free-form status.
    pub status: String,
    /// User on whose behalf the work runs.
    pub user_id: Option<String>,
    /// Documents the unit acts on.
    pub documents: Vec<DocumentRef>,
    /// Whether the first document is the root of an impacted tree.
    pub document_tree: bool,
    /// Path captured at scheduling time (empty unless capture was on).
    pub schedule_path: SchedulePath,
    /// When the unit was scheduled (ms).
    pub scheduling_time: u64,
    /// When the unit first started running (ms), `0` if not yet.
    pub start_time: u64,
    /// When the unit last completed, failed, was canceled or suspended (ms), `0` if not yet.
    pub completion_time: u64,
    /// Error message of a failed unit.
    pub error: Option<String>,
}

/// Read-only observer of a scheduled unit.
#[derive(Debug, Clone)]
pub struct WorkHandle {
    record: Arc<WorkRecord>,
}

impl WorkHandle {
    pub(crate) const fn new(record: Arc<WorkRecord>) -> Self {
        Self { record }
    }

    /// Work id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// Category the unit was routed to.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.record.category
    }

    /// Human-readable name.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.record.title
    }

    /// Current state of this instance.
    #[must_use]
    pub fn state(&self) -> WorkState {
        self.record.state()
    }

    /// Last reported progress.
    #[must_use]
    pub fn progress(&self) -> Progress {
        self.record.live.lock().progress
    }

    /// Last reported status text.
    #[must_use]
    pub fn status(&self) -> String {
        self.record.live.lock().status.clone()
    }

    /// Path captured at scheduling time.
    #[must_use]
    pub fn schedule_path(&self) -> &SchedulePath {
        &self.record.schedule_path
    }

    /// When the unit was scheduled (ms).
    #[must_use]
    pub fn scheduling_time(&self) -> u64 {
        self.record.scheduling_time
    }

    /// When the unit first started (ms), `0` if never.
    #[must_use]
    pub fn start_time(&self) -> u64 {
        self.record.live.lock().start_time
    }

    /// When the unit last reached a terminal state or suspended (ms), `0` if not yet.
    #[must_use]
    pub fn completion_time(&self) -> u64 {
        self.record.completion_time()
    }

    /// Full snapshot.
    #[must_use]
    pub fn info(&self) -> WorkInfo {
        self.record.info()
    }

    /// Block until this instance reaches a terminal state or `timeout`
    /// elapses; returns the state observed last.
    pub fn wait(&self, timeout: Duration) -> WorkState {
        let deadline = Instant::now() + timeout;
        let mut live = self.record.live.lock();
        while !live.state.is_terminal() {
            if self.record.changed.wait_until(&mut live, deadline).timed_out() {
                break;
            }
        }
        live.state
    }

    /// Block until this instance reaches `state` (or any terminal state) or
    /// `timeout` elapses; returns whether `state` was reached.
    pub fn wait_for_state(&self, state: WorkState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut live = self.record.live.lock();
        while live.state != state && !live.state.is_terminal() {
            if self.record.changed.wait_until(&mut live, deadline).timed_out() {
                break;
            }
        }
        live.state == state
    }
}

/// Engine services available to a running unit.
pub struct WorkContext {
    record: Arc<WorkRecord>,
    engine: Arc<Engine>,
}

impl WorkContext {
    pub(crate) const fn new(record: Arc<WorkRecord>, engine: Arc<Engine>) -> Self {
        Self { record, engine }
    }

    /// Id of the running unit.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// Category of the running unit.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.record.category
    }

    /// Path captured when the running unit was scheduled.
    #[must_use]
    pub fn schedule_path(&self) -> &SchedulePath {
        &self.record.schedule_path
    }

    /// Whether the engine asked this unit to suspend.
    #[must_use]
    pub fn is_suspending(&self) -> bool {
        self.record.is_suspending()
    }

    /// Acknowledge a suspend request once resumable state is saved; `work()`
    /// should return `Ok(())` right after. Ignored when no suspension was
    /// requested.
    pub fn suspended(&self) {
        if self.record.is_suspending() {
            self.record.acknowledge_suspended();
        }
    }

    /// Publish progress.
    pub fn set_progress(&self, progress: Progress) {
        self.record.set_progress(progress);
    }

    /// Last published progress.
    #[must_use]
    pub fn progress(&self) -> Progress {
        self.record.live.lock().progress
    }

    /// Publish free-form status text.
    pub fn set_status(&self, status: impl Into<String>) {
        self.record.live.lock().status = status.into();
    }

    /// Schedule a nested unit. With capture enabled its path extends the
    /// running unit's path.
    ///
    /// A unit routed to the running unit's own category never waits for
    /// room: when that queue is full it fails with `QueueFull` even under
    /// [`crate::config::OverflowPolicy::Block`], since waiting would hold the
    /// worker that has to free the slot. Other categories keep their policy.
    ///
    /// # Errors
    ///
    /// Same as [`crate::core::Scheduler::schedule`].
    pub fn schedule<W: Work>(
        &self,
        work: W,
        policy: SchedulingPolicy,
    ) -> Result<WorkHandle, SchedulerError> {
        self.engine
            .schedule_boxed(Box::new(work), policy, Some(self.record.as_ref()))
    }
}

impl fmt::Debug for WorkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkContext")
            .field("id", &self.record.id)
            .field("category", &self.record.category)
            .finish_non_exhaustive()
    }
}

/// A unit together with its engine record, as held by queues.
pub(crate) struct WorkInstance {
    pub(crate) record: Arc<WorkRecord>,
    pub(crate) work: Box<dyn Work>,
}

impl WorkInstance {
    pub(crate) fn handle(&self) -> WorkHandle {
        WorkHandle::new(Arc::clone(&self.record))
    }
}
