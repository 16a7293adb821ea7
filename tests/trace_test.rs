//! Failure tracing across nested scheduling calls.

mod common;

use std::error::Error;

use common::{config, Failing, Nest, WAIT};
use workq_engine::builders::SchedulerBuilder;
use workq_engine::core::{InMemoryFailureSink, Scheduler, Trace, WorkState};

fn traced_scheduler(sink: &InMemoryFailureSink) -> Scheduler {
    SchedulerBuilder::new(config(2, 16).with_capture_schedule_stack(true))
        .with_sink(sink.clone())
        .build()
        .unwrap()
}

#[test]
fn test_simple_failure_trace_matches_own_path() {
    let sink = InMemoryFailureSink::new(16);
    let scheduler = traced_scheduler(&sink);

    let handle = scheduler.schedule_default(Failing::new("F")).unwrap();
    assert!(scheduler.await_completion(WAIT));
    assert_eq!(handle.state(), WorkState::Failed);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let trace = records[0].trace().unwrap();
    assert_eq!(trace.path(), handle.schedule_path());
    assert_eq!(trace.path().len(), 1);
    assert!(trace.cause().is_none());
    assert!(scheduler.shutdown(WAIT));
}

#[test]
fn test_chained_failure_trace_walks_to_outer_call() {
    let sink = InMemoryFailureSink::new(16);
    let scheduler = traced_scheduler(&sink);

    let outer = scheduler
        .schedule_default(Nest {
            id: "N".into(),
            child: "F".into(),
        })
        .unwrap();
    assert!(scheduler.await_completion(WAIT));
    assert_eq!(outer.state(), WorkState::Completed);

    let records = sink.records_for("F");
    assert_eq!(records.len(), 1);
    let record = &records[0];
    let trace = record.trace().unwrap();

    // The failing unit's path extends the path of the unit that scheduled it
    let ids: Vec<_> = trace.path().entries().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["N", "F"]);
    assert_eq!(trace.path(), &record.work.schedule_path);

    let cause = trace.cause().unwrap();
    assert_eq!(cause.path(), outer.schedule_path());
    assert_eq!(record.root_trace().map(Trace::path), Some(outer.schedule_path()));

    // Same chain through the standard error interface
    let source = trace.source().unwrap();
    assert_eq!(source.to_string(), format!("scheduled via {}", outer.schedule_path()));
    assert!(source.source().is_none());
    assert!(scheduler.shutdown(WAIT));
}

#[test]
fn test_failure_error_chain_walks_to_outer_call() {
    let sink = InMemoryFailureSink::new(16);
    let scheduler = traced_scheduler(&sink);

    let outer = scheduler
        .schedule_default(Nest {
            id: "N".into(),
            child: "F".into(),
        })
        .unwrap();
    assert!(scheduler.await_completion(WAIT));

    let record = sink.records_for("F").remove(0);
    assert_eq!(record.failure.error().to_string(), "failing work F");

    // From the work error itself, through every scheduling level
    let chain: Vec<String> =
        std::iter::successors(Some(&record.failure as &dyn Error), |&e: &&dyn Error| e.source())
            .map(ToString::to_string)
            .collect();
    assert_eq!(
        chain,
        vec![
            "failing work F".to_string(),
            format!("scheduled via {}", record.work.schedule_path),
            format!("scheduled via {}", outer.schedule_path()),
        ]
    );
    assert_eq!(
        chain[2],
        "scheduled via Nest[N](default)",
        "outermost level is the top-level call"
    );
    assert!(scheduler.shutdown(WAIT));
}

#[test]
fn test_no_trace_without_capture() {
    let sink = InMemoryFailureSink::new(16);
    let scheduler = SchedulerBuilder::new(config(1, 16))
        .with_sink(sink.clone())
        .build()
        .unwrap();

    let handle = scheduler
        .schedule_default(Nest {
            id: "N".into(),
            child: "F".into(),
        })
        .unwrap();
    assert!(scheduler.await_completion(WAIT));
    assert!(handle.schedule_path().is_empty());

    let records = sink.records_for("F");
    assert_eq!(records.len(), 1);
    assert!(records[0].trace().is_none());

    // Turning capture on only affects later calls
    assert!(!scheduler.capture_schedule_stack(true));
    let traced = scheduler.schedule_default(Failing::new("G")).unwrap();
    assert!(scheduler.await_completion(WAIT));
    assert_eq!(traced.schedule_path().len(), 1);
    assert!(sink.records_for("G")[0].trace().is_some());
    assert!(scheduler.shutdown(WAIT));
}
