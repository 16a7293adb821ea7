//! Tests for configuration validation

use std::time::Duration;

use workq_engine::config::{
    OverflowPolicy, QueueConfig, RetentionConfig, SchedulerConfig, DEFAULT_CATEGORY,
};

#[test]
fn test_default_config_is_valid() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.default_category, DEFAULT_CATEGORY);
    assert!(cfg.queues[DEFAULT_CATEGORY].worker_count >= 1);
    assert_eq!(cfg.retention, RetentionConfig::default());
    assert!(!cfg.capture_schedule_stack);
}

#[test]
fn test_queue_config_invalid_values() {
    assert!(QueueConfig::new().with_capacity(0).validate().is_err());
    assert!(QueueConfig::new().with_worker_count(0).validate().is_err());
    assert!(QueueConfig::new()
        .with_thread_stack_size(1024)
        .validate()
        .is_err());
}

#[test]
fn test_default_category_needs_a_queue() {
    let mut cfg = SchedulerConfig::new();
    cfg.default_category = "missing".into();
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("missing"));
}

#[test]
fn test_invalid_queue_is_named() {
    let cfg = SchedulerConfig::new().with_queue("io", QueueConfig::new().with_capacity(0));
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("`io`"));
}

#[test]
fn test_from_json_str_fills_defaults() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "queues": {
                "default": { "worker_count": 2 },
                "io": { "capacity": 8, "worker_count": 1, "overflow": "fail_fast" }
            },
            "capture_schedule_stack": true,
            "retention": { "max_entries": 10, "ttl_ms": 60000 }
        }"#,
    )
    .unwrap();

    assert_eq!(cfg.queues["default"].worker_count, 2);
    assert_eq!(cfg.queues["default"].capacity, 1024);
    assert_eq!(cfg.queues["io"].overflow, OverflowPolicy::FailFast);
    assert!(cfg.capture_schedule_stack);
    assert_eq!(cfg.retention.ttl_ms, Some(60_000));
    assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(5));
}

#[test]
fn test_from_json_str_rejects_bad_input() {
    assert!(SchedulerConfig::from_json_str("not json").is_err());
    assert!(SchedulerConfig::from_json_str(r#"{ "queues": {} }"#).is_err());
}

#[test]
fn test_shutdown_timeout_builder() {
    let cfg = SchedulerConfig::new().with_shutdown_timeout(Duration::from_millis(250));
    assert_eq!(cfg.shutdown_timeout_ms, 250);
}

#[test]
fn test_from_env_overrides_default_queue() {
    std::env::set_var("WORKQ_DEFAULT_WORKERS", "3");
    std::env::set_var("WORKQ_OVERFLOW", "fail_fast");
    std::env::set_var("WORKQ_CAPTURE_STACK", "true");
    let cfg = SchedulerConfig::from_env();
    std::env::set_var("WORKQ_OVERFLOW", "sideways");
    let bad = SchedulerConfig::from_env();
    for name in ["WORKQ_DEFAULT_WORKERS", "WORKQ_OVERFLOW", "WORKQ_CAPTURE_STACK"] {
        std::env::remove_var(name);
    }

    let cfg = cfg.unwrap();
    assert_eq!(cfg.queues[DEFAULT_CATEGORY].worker_count, 3);
    assert_eq!(cfg.queues[DEFAULT_CATEGORY].overflow, OverflowPolicy::FailFast);
    assert!(cfg.capture_schedule_stack);
    assert!(bad.unwrap_err().contains("WORKQ_OVERFLOW"));
}
