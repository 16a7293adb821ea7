//! Scheduler and queue configuration structures.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Category used for units that do not name one.
pub const DEFAULT_CATEGORY: &str = "default";

/// What `schedule` does when the target queue is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Block the submitter until a slot frees.
    #[default]
    Block,
    /// Reject the submission with `SchedulerError::QueueFull`.
    FailFast,
}

/// Configuration of one category queue and its worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of units waiting in the queue.
    pub capacity: usize,
    /// Number of dedicated worker threads.
    pub worker_count: usize,
    /// Behaviour when the queue is full.
    pub overflow: OverflowPolicy,
    /// Stack size of each worker thread in bytes.
    pub thread_stack_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            worker_count: num_cpus::get().max(1),
            overflow: OverflowPolicy::Block,
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl QueueConfig {
    /// Default queue configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the queue capacity.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the number of worker threads.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the overflow policy.
    #[must_use]
    pub const fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Validate queue configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("capacity must be greater than 0".into());
        }
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }
}

/// How long terminal (completed, failed, canceled) states stay queryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Most recent terminal records kept; older ones are evicted first.
    pub max_entries: usize,
    /// Optional age limit in milliseconds after completion.
    pub ttl_ms: Option<u64>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_entries: 1024,
            ttl_ms: None,
        }
    }
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Category of units that do not name one. Must have a queue.
    pub default_category: String,
    /// Map of category to queue configuration.
    pub queues: HashMap<String, QueueConfig>,
    /// Capture schedule paths for failure tracing.
    pub capture_schedule_stack: bool,
    /// Terminal state retention.
    pub retention: RetentionConfig,
    /// Default timeout used by `Scheduler::shutdown_default`.
    pub shutdown_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let mut queues = HashMap::new();
        queues.insert(DEFAULT_CATEGORY.to_string(), QueueConfig::default());
        Self {
            default_category: DEFAULT_CATEGORY.to_string(),
            queues,
            capture_schedule_stack: false,
            retention: RetentionConfig::default(),
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl SchedulerConfig {
    /// Configuration with a single default queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the queue for `category`.
    #[must_use]
    pub fn with_queue(mut self, category: impl Into<String>, queue: QueueConfig) -> Self {
        self.queues.insert(category.into(), queue);
        self
    }

    /// Replace the default category's queue configuration.
    #[must_use]
    pub fn with_default_queue(mut self, queue: QueueConfig) -> Self {
        self.queues.insert(self.default_category.clone(), queue);
        self
    }

    /// Enable or disable schedule path capture.
    #[must_use]
    pub const fn with_capture_schedule_stack(mut self, enabled: bool) -> Self {
        self.capture_schedule_stack = enabled;
        self
    }

    /// Set the terminal state retention.
    #[must_use]
    pub const fn with_retention(mut self, retention: RetentionConfig) -> Self {
        self.retention = retention;
        self
    }

    /// Set the default shutdown timeout.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Default shutdown timeout as a `Duration`.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Validate all queues and ensure the default category has one.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.queues.is_empty() {
            return Err("at least one queue must be defined".into());
        }
        if !self.queues.contains_key(&self.default_category) {
            return Err(format!(
                "default category `{}` has no queue",
                self.default_category
            ));
        }
        for (name, queue) in &self.queues {
            queue
                .validate()
                .map_err(|e| format!("queue `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build the default configuration overridden by environment variables.
    ///
    /// Loads a `.env` file if present, then reads:
    ///
    /// - `WORKQ_DEFAULT_WORKERS`: worker threads of the default queue
    /// - `WORKQ_DEFAULT_CAPACITY`: capacity of the default queue
    /// - `WORKQ_OVERFLOW`: `block` or `fail_fast` for the default queue
    /// - `WORKQ_CAPTURE_STACK`: `true`/`false`
    /// - `WORKQ_RETENTION`: retained terminal records
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        let mut queue = cfg
            .queues
            .get(&cfg.default_category)
            .cloned()
            .unwrap_or_default();

        if let Some(workers) = env_parse::<usize>("WORKQ_DEFAULT_WORKERS")? {
            queue.worker_count = workers;
        }
        if let Some(capacity) = env_parse::<usize>("WORKQ_DEFAULT_CAPACITY")? {
            queue.capacity = capacity;
        }
        if let Ok(overflow) = std::env::var("WORKQ_OVERFLOW") {
            queue.overflow = match overflow.trim() {
                "block" => OverflowPolicy::Block,
                "fail_fast" => OverflowPolicy::FailFast,
                other => return Err(format!("WORKQ_OVERFLOW: unknown policy `{other}`")),
            };
        }
        if let Some(capture) = env_parse::<bool>("WORKQ_CAPTURE_STACK")? {
            cfg.capture_schedule_stack = capture;
        }
        if let Some(max_entries) = env_parse::<usize>("WORKQ_RETENTION")? {
            cfg.retention.max_entries = max_entries;
        }

        cfg = cfg.with_default_queue(queue);
        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("{name}: {e}")),
        Err(_) => Ok(None),
    }
}
