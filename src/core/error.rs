//! Error types for scheduler operations.

use thiserror::Error;

/// Errors surfaced synchronously by the scheduler.
///
/// Failures raised inside `Work::work` never show up here: they are absorbed
/// into the unit's `Failed` state and reported through the failure sink.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Queue for the category is at capacity and configured to fail fast.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// No queue is configured for the requested category.
    #[error("unknown category: {0}")]
    UnknownCategory(String),
    /// The scheduler has been shut down and accepts no more work.
    #[error("scheduler is shut down")]
    Shutdown,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A persisted unit names a kind with no registered factory.
    #[error("no factory registered for work kind `{0}`")]
    UnknownKind(String),
    /// Durable store failure with context.
    #[error("store error: {0}")]
    Store(String),
    /// Internal failure (worker thread spawn, etc.).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Application-facing result using anyhow, returned by work implementations.
pub type AppResult<T> = Result<T, anyhow::Error>;
