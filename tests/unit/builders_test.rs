//! Tests for builder modules

use std::time::Duration;

use workq_engine::builders::{build_scheduler, SchedulerBuilder};
use workq_engine::config::{QueueConfig, SchedulerConfig};
use workq_engine::core::{InMemoryFailureSink, SchedulerError};
use workq_engine::infra::InMemoryWorkStore;

#[test]
fn test_build_scheduler_defaults() {
    let cfg = SchedulerConfig::new().with_default_queue(QueueConfig::new().with_worker_count(2));
    let scheduler = build_scheduler(&cfg).unwrap();
    assert_eq!(scheduler.categories(), vec!["default"]);
    assert_eq!(scheduler.queue("default").unwrap().worker_count(), 2);
    assert!(scheduler.persisted_ids().unwrap().is_empty());
    assert!(scheduler.shutdown(Duration::from_secs(5)));
}

#[test]
fn test_builder_rejects_invalid_config() {
    let cfg = SchedulerConfig::new().with_default_queue(QueueConfig::new().with_capacity(0));
    let err = SchedulerBuilder::new(cfg).build().unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidConfig(_)));
}

#[test]
fn test_builder_wires_collaborators() {
    let store = InMemoryWorkStore::new();
    let scheduler = SchedulerBuilder::new(
        SchedulerConfig::new()
            .with_default_queue(QueueConfig::new().with_worker_count(1))
            .with_capture_schedule_stack(true),
    )
    .with_store(store.clone())
    .with_sink(InMemoryFailureSink::new(4))
    .build()
    .unwrap();

    assert!(scheduler.is_capturing_schedule_stack());
    assert!(scheduler.config().capture_schedule_stack);
    assert!(scheduler.shutdown_default());
    assert!(store.is_empty());
}
