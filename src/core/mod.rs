//! Core scheduling abstractions: units of work, queues and the scheduler.

pub mod error;
pub mod progress;
pub mod schedule_path;
pub mod scheduler;
pub mod sink;
pub mod store;
pub mod transaction;
pub mod work;
pub mod work_queue;

pub use error::{AppResult, SchedulerError};
pub use progress::Progress;
pub use schedule_path::{PathEntry, SchedulePath, Trace};
pub use scheduler::Scheduler;
pub use sink::{
    build_failure_record, FailureRecord, FailureSink, InMemoryFailureSink, LogFailureSink,
    WorkFailure,
};
pub use store::{WorkRegistry, WorkSnapshot, WorkStore};
pub use transaction::AfterCommit;
pub use work::{
    new_work_id, DocumentRef, SchedulingPolicy, Work, WorkContext, WorkHandle, WorkInfo,
    WorkState,
};
pub use work_queue::{QueueStats, WorkQueue};

pub(crate) use work::{WorkInstance, WorkRecord};
