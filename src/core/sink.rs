//! Failure sink implementations.
//!
//! Every `Failed` transition produces exactly one [`FailureRecord`]. The
//! default sink logs it through `tracing`; the in-memory sink keeps a bounded
//! buffer for tests and diagnostics.

use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{Trace, WorkInfo};
use crate::util::clock::now_ms;

/// The error a unit failed with, wrapped so that its `source()` chain
/// continues through the schedule path [`Trace`].
///
/// Walking `source()` from a `WorkFailure` visits the failing unit's own
/// trace level first and ends at the outermost scheduling call. The
/// original error (with its own context chain) stays reachable through
/// [`WorkFailure::error`].
#[derive(Debug, Clone)]
pub struct WorkFailure {
    error: Arc<anyhow::Error>,
    trace: Option<Trace>,
}

impl WorkFailure {
    /// Wrap `error`, chaining it to `trace`.
    #[must_use]
    pub fn new(error: anyhow::Error, trace: Option<Trace>) -> Self {
        Self {
            error: Arc::new(error),
            trace,
        }
    }

    /// The error returned (or panic raised) by `work()`.
    #[must_use]
    pub fn error(&self) -> &anyhow::Error {
        &self.error
    }

    /// Schedule-path trace, present when capture was enabled.
    #[must_use]
    pub const fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }
}

impl fmt::Display for WorkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.error)
    }
}

impl Error for WorkFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.trace.as_ref().map(|t| t as &(dyn Error + 'static))
    }
}

/// Observability record for one failed unit.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    /// Snapshot of the failed unit.
    pub work: WorkInfo,
    /// Error chain rendered as text (`{:#}` of the error).
    pub error: String,
    /// The failure itself, chained to its schedule path.
    pub failure: WorkFailure,
    /// Timestamp milliseconds.
    pub recorded_at_ms: u64,
}

impl FailureRecord {
    /// Schedule-path trace, present when capture was enabled.
    #[must_use]
    pub const fn trace(&self) -> Option<&Trace> {
        self.failure.trace()
    }

    /// The outermost scheduling call behind this failure.
    #[must_use]
    pub fn root_trace(&self) -> Option<&Trace> {
        self.trace().map(Trace::root)
    }
}

/// Failure sink abstraction.
pub trait FailureSink: Send + Sync {
    /// Record a failure.
    fn record(&self, record: &FailureRecord);
}

/// Sink that emits failures as structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFailureSink;

impl FailureSink for LogFailureSink {
    fn record(&self, record: &FailureRecord) {
        let root = record
            .root_trace()
            .map(|t| t.path().to_string())
            .unwrap_or_default();
        tracing::error!(
            work_id = %record.work.id,
            category = %record.work.category,
            title = %record.work.title,
            path = %record.work.schedule_path,
            root = %root,
            error = %record.error,
            "work failed"
        );
    }
}

/// In-memory failure sink with a bounded buffer. Clones share the buffer.
#[derive(Debug, Clone)]
pub struct InMemoryFailureSink {
    records: Arc<Mutex<VecDeque<FailureRecord>>>,
    max_records: usize,
}

impl InMemoryFailureSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_records: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(VecDeque::with_capacity(max_records.min(1024)))),
            max_records,
        }
    }

    /// Retrieve a snapshot of stored records.
    #[must_use]
    pub fn records(&self) -> Vec<FailureRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Records for a given work id.
    #[must_use]
    pub fn records_for(&self, work_id: &str) -> Vec<FailureRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.work.id == work_id)
            .cloned()
            .collect()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl FailureSink for InMemoryFailureSink {
    fn record(&self, record: &FailureRecord) {
        let mut records = self.records.lock();
        if records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back(record.clone());
    }
}

/// Helper to build a failure record from a unit snapshot and its error.
///
/// The trace is derived from the snapshot's schedule path, so it is absent
/// when capture was off at scheduling time.
#[must_use]
pub fn build_failure_record(work: WorkInfo, error: anyhow::Error) -> FailureRecord {
    let failure = WorkFailure::new(error, Trace::from_path(&work.schedule_path));
    FailureRecord {
        error: failure.to_string(),
        failure,
        work,
        recorded_at_ms: now_ms(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PathEntry, Progress, SchedulePath, WorkState};

    fn info(id: &str, path: SchedulePath) -> WorkInfo {
        WorkInfo {
            id: id.into(),
            category: "default".into(),
            title: "Fail".into(),
            kind: "Fail".into(),
            state: WorkState::Failed,
            progress: Progress::INDETERMINATE,
            status: String::new(),
            user_id: None,
            documents: Vec::new(),
            document_tree: false,
            schedule_path: path,
            scheduling_time: 1,
            start_time: 2,
            completion_time: 3,
            error: None,
        }
    }

    #[test]
    fn test_in_memory_sink_is_bounded() {
        let sink = InMemoryFailureSink::new(2);
        for id in ["a", "b", "c"] {
            let err = anyhow::anyhow!("boom");
            sink.record(&build_failure_record(info(id, SchedulePath::default()), err));
        }
        let ids: Vec<_> = sink.records().into_iter().map(|r| r.work.id).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_record_carries_trace_for_captured_path() {
        let path = SchedulePath::root(PathEntry::new("n", "default", "Nest"))
            .extend(PathEntry::new("f", "default", "Fail"));
        let err = anyhow::anyhow!("inner").context("outer");
        let record = build_failure_record(info("f", path), err);

        assert_eq!(record.error, "outer: inner");
        assert_eq!(record.failure.error().root_cause().to_string(), "inner");
        assert_eq!(record.trace().map(|t| t.path().len()), Some(2));
        assert_eq!(record.root_trace().map(|t| t.path().len()), Some(1));

        let untraced =
            build_failure_record(info("f", SchedulePath::default()), anyhow::anyhow!("x"));
        assert!(untraced.trace().is_none());
        assert!(untraced.failure.source().is_none());
    }

    #[test]
    fn test_failure_source_chain_reaches_outermost_call() {
        let path = SchedulePath::root(PathEntry::new("a", "default", "A"))
            .extend(PathEntry::new("b", "default", "B"))
            .extend(PathEntry::new("c", "default", "C"));
        let record = build_failure_record(info("c", path), anyhow::anyhow!("disk gone"));

        let chain: Vec<String> =
            std::iter::successors(Some(&record.failure as &dyn Error), |&e: &&dyn Error| e.source())
                .map(ToString::to_string)
                .collect();
        assert_eq!(
            chain,
            vec![
                "disk gone",
                "scheduled via A[a](default) > B[b](default) > C[c](default)",
                "scheduled via A[a](default) > B[b](default)",
                "scheduled via A[a](default)",
            ]
        );
    }
}
