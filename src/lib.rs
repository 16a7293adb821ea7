//! # workq engine
//!
//! An asynchronous work scheduling and execution engine.
//!
//! Callers submit units of work to named categories. Each category owns a
//! bounded FIFO queue drained by a fixed pool of dedicated worker threads,
//! each running its own single-threaded tokio runtime, so async `work()`
//! bodies never block the caller's runtime.
//!
//! ## Key Features
//!
//! - **Scheduling policies**: deduplicate by work id (`IfNotScheduled`,
//!   `IfNotRunning`, `IfNotRunningOrScheduled`) or supersede queued copies
//!   (`CancelScheduled`)
//! - **Observable lifecycle**: `Scheduled -> Running -> Completed | Failed`,
//!   with `Canceled` for units that never run, plus progress and status
//! - **Failure tracing**: with schedule path capture on, a failure deep in a
//!   chain of nested `schedule` calls can be walked back to the outermost
//!   call that started it
//! - **Cooperative suspension**: long-running units save their state, get
//!   re-enqueued, and survive a shutdown through a durable store
//! - **Back-pressure**: full queues block submitters or fail fast
//! - **After-commit batches**: schedule only if the surrounding unit of work
//!   commits
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use workq_engine::config::SchedulerConfig;
//! use workq_engine::core::{Scheduler, SchedulingPolicy};
//!
//! let scheduler = Scheduler::new(SchedulerConfig::new())?;
//! let handle = scheduler.schedule(Reindex::new("doc-1"), SchedulingPolicy::IfNotScheduled)?;
//! assert!(scheduler.await_completion(Duration::from_secs(10)));
//! println!("{} ended {}", handle.id(), handle.state());
//! scheduler.shutdown(Duration::from_secs(5));
//! ```
//!
//! For complete examples, see the integration tests under `tests/`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: work, queues, scheduler, sinks and stores.
pub mod core;
/// Configuration models for the scheduler, its queues and retention.
pub mod config;
/// Builders to construct a scheduler from configuration.
pub mod builders;
/// Durable store backends.
pub mod infra;
/// Shared utilities.
pub mod util;
