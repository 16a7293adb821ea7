//! Tests for utility functions

use workq_engine::core::new_work_id;
use workq_engine::util::now_ms;

#[test]
fn test_clock_is_monotonic_and_non_zero() {
    let first = now_ms();
    let second = now_ms();
    assert!(first > 0);
    assert!(second >= first);
}

#[test]
fn test_work_ids_are_unique() {
    let a = new_work_id();
    let b = new_work_id();
    assert_ne!(a, b);
    assert_eq!(a.len(), 36);
}

#[test]
fn test_init_tracing_is_idempotent() {
    workq_engine::util::init_tracing_with_default("workq_engine=debug");
    workq_engine::util::init_tracing();
    assert!(tracing::dispatcher::has_been_set());
}
