//! Configuration models for the scheduler, its queues and retention.

pub mod scheduler;

pub use scheduler::{
    OverflowPolicy, QueueConfig, RetentionConfig, SchedulerConfig, DEFAULT_CATEGORY,
};
