//! Tests for error types

use workq_engine::core::SchedulerError;

#[test]
fn test_queue_full_error() {
    let err = SchedulerError::QueueFull("reindex".to_string());
    assert_eq!(format!("{err}"), "queue full: reindex");
}

#[test]
fn test_unknown_category_error() {
    let err = SchedulerError::UnknownCategory("gpu".to_string());
    assert_eq!(format!("{err}"), "unknown category: gpu");
}

#[test]
fn test_shutdown_error() {
    assert_eq!(format!("{}", SchedulerError::Shutdown), "scheduler is shut down");
}

#[test]
fn test_unknown_kind_error() {
    let err = SchedulerError::UnknownKind("summing".to_string());
    assert_eq!(format!("{err}"), "no factory registered for work kind `summing`");
}

#[test]
fn test_store_error_converts_to_anyhow() {
    let err: anyhow::Error = SchedulerError::Store("disk full".to_string()).into();
    assert_eq!(format!("{err}"), "store error: disk full");
    assert!(err.downcast_ref::<SchedulerError>().is_some());
}
