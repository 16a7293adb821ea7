//! Shared work implementations for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use workq_engine::config::{QueueConfig, SchedulerConfig};
use workq_engine::core::{
    AppResult, Progress, SchedulingPolicy, Work, WorkContext, WorkSnapshot,
};

pub const WAIT: Duration = Duration::from_secs(10);

/// Single default queue with `workers` threads and `capacity` slots.
pub fn config(workers: usize, capacity: usize) -> SchedulerConfig {
    workq_engine::util::init_tracing_with_default("workq_engine=warn");
    SchedulerConfig::new().with_default_queue(
        QueueConfig::new()
            .with_worker_count(workers)
            .with_capacity(capacity),
    )
}

/// Completes immediately, counting runs.
pub struct Counted {
    pub id: String,
    pub category: Option<String>,
    pub runs: Arc<AtomicUsize>,
}

impl Counted {
    pub fn new(id: impl Into<String>, runs: &Arc<AtomicUsize>) -> Self {
        Self {
            id: id.into(),
            category: None,
            runs: Arc::clone(runs),
        }
    }

    pub fn in_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }
}

#[async_trait]
impl Work for Counted {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    async fn work(&mut self, _ctx: &WorkContext) -> AppResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Runs until its gate opens. Used to occupy a worker.
pub struct Gated {
    pub id: String,
    pub open: Arc<AtomicBool>,
    pub runs: Arc<AtomicUsize>,
}

impl Gated {
    pub fn new(id: impl Into<String>, open: &Arc<AtomicBool>) -> Self {
        Self {
            id: id.into(),
            open: Arc::clone(open),
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Work for Gated {
    fn id(&self) -> &str {
        &self.id
    }

    async fn work(&mut self, ctx: &WorkContext) -> AppResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        ctx.set_status("waiting for gate");
        while !self.open.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        ctx.set_status("done");
        Ok(())
    }
}

/// Appends its value to a shared log when it runs.
pub struct Recorder {
    pub id: String,
    pub value: u32,
    pub log: Arc<Mutex<Vec<u32>>>,
}

impl Recorder {
    pub fn new(id: impl Into<String>, value: u32, log: &Arc<Mutex<Vec<u32>>>) -> Self {
        Self {
            id: id.into(),
            value,
            log: Arc::clone(log),
        }
    }
}

#[async_trait]
impl Work for Recorder {
    fn id(&self) -> &str {
        &self.id
    }

    async fn work(&mut self, _ctx: &WorkContext) -> AppResult<()> {
        self.log.lock().push(self.value);
        Ok(())
    }
}

/// Fails immediately (or panics) and records its `clean_up` calls.
pub struct Failing {
    pub id: String,
    pub panic: bool,
    pub cleanups: Arc<Mutex<Vec<bool>>>,
}

impl Failing {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            panic: false,
            cleanups: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn panicking(id: impl Into<String>) -> Self {
        Self {
            panic: true,
            ..Self::new(id)
        }
    }
}

#[async_trait]
impl Work for Failing {
    fn id(&self) -> &str {
        &self.id
    }

    async fn work(&mut self, _ctx: &WorkContext) -> AppResult<()> {
        if self.panic {
            panic!("exploded in {}", self.id);
        }
        anyhow::bail!("failing work {}", self.id)
    }

    fn clean_up(&mut self, ok: bool, _error: Option<&anyhow::Error>) {
        self.cleanups.lock().push(ok);
    }
}

/// Schedules a [`Failing`] child from inside `work()`.
pub struct Nest {
    pub id: String,
    pub child: String,
}

#[async_trait]
impl Work for Nest {
    fn id(&self) -> &str {
        &self.id
    }

    async fn work(&mut self, ctx: &WorkContext) -> AppResult<()> {
        ctx.schedule(Failing::new(self.child.clone()), SchedulingPolicy::Always)?;
        Ok(())
    }
}

/// Sums `1..=total` one step at a time, honoring suspension.
pub struct Summing {
    pub id: String,
    pub total: u64,
    pub done: u64,
    pub sum: u64,
    pub step: Duration,
    pub result: Arc<Mutex<Option<u64>>>,
    pub invocations: Arc<AtomicUsize>,
}

impl Summing {
    pub const KIND: &'static str = "summing";

    pub fn new(id: impl Into<String>, total: u64, step: Duration) -> Self {
        Self {
            id: id.into(),
            total,
            done: 0,
            sum: 0,
            step,
            result: Arc::new(Mutex::new(None)),
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Factory rebuilding a unit from its snapshot, reporting into `result`.
    pub fn restore(
        snapshot: &WorkSnapshot,
        result: &Arc<Mutex<Option<u64>>>,
        invocations: &Arc<AtomicUsize>,
    ) -> AppResult<Self> {
        let field = |name: &str| {
            snapshot.state[name]
                .as_u64()
                .ok_or_else(|| anyhow::anyhow!("missing `{name}` in snapshot"))
        };
        Ok(Self {
            id: snapshot.id.clone(),
            total: field("total")?,
            done: field("done")?,
            sum: field("sum")?,
            step: Duration::from_millis(field("step_ms")?),
            result: Arc::clone(result),
            invocations: Arc::clone(invocations),
        })
    }
}

#[async_trait]
impl Work for Summing {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    async fn work(&mut self, ctx: &WorkContext) -> AppResult<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        while self.done < self.total {
            if ctx.is_suspending() {
                ctx.suspended();
                return Ok(());
            }
            self.done += 1;
            self.sum += self.done;
            ctx.set_progress(Progress::count(self.done, self.total));
            tokio::time::sleep(self.step).await;
        }
        *self.result.lock() = Some(self.sum);
        Ok(())
    }

    fn save_state(&self) -> AppResult<serde_json::Value> {
        Ok(serde_json::json!({
            "total": self.total,
            "done": self.done,
            "sum": self.sum,
            "step_ms": u64::try_from(self.step.as_millis())?,
        }))
    }
}
