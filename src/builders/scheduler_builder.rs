//! Builder wiring configuration, store, failure sink and registry into a
//! running [`Scheduler`].

use std::sync::Arc;

use tracing::info;

use crate::config::SchedulerConfig;
use crate::core::scheduler::Engine;
use crate::core::{
    AppResult, FailureSink, LogFailureSink, Scheduler, SchedulerError, Work, WorkRegistry,
    WorkSnapshot, WorkStore,
};

/// Fluent builder for [`Scheduler`].
///
/// ```rust,ignore
/// let scheduler = SchedulerBuilder::new(SchedulerConfig::new())
///     .with_store(InMemoryWorkStore::new())
///     .with_sink(InMemoryFailureSink::new(64))
///     .register("reindex", |snapshot| Reindex::restore(snapshot))
///     .build()?;
/// ```
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    store: Option<Box<dyn WorkStore>>,
    sink: Arc<dyn FailureSink>,
    registry: WorkRegistry,
}

impl SchedulerBuilder {
    /// Start from `config`, no store and a logging failure sink.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            store: None,
            sink: Arc::new(LogFailureSink),
            registry: WorkRegistry::new(),
        }
    }

    /// Keep suspended and shut-down units in `store`.
    #[must_use]
    pub fn with_store<S: WorkStore + 'static>(mut self, store: S) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Report failures to `sink`.
    #[must_use]
    pub fn with_sink<S: FailureSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Replace the work factory registry.
    #[must_use]
    pub fn with_registry(mut self, registry: WorkRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register a factory rebuilding units of `kind` from snapshots.
    #[must_use]
    pub fn register<F, W>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&WorkSnapshot) -> AppResult<W> + Send + Sync + 'static,
        W: Work,
    {
        self.registry.register(kind, factory);
        self
    }

    /// Validate the configuration, create the queues and start every worker.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when validation fails, `Internal` when a worker thread
    /// cannot be spawned.
    pub fn build(self) -> Result<Scheduler, SchedulerError> {
        self.config
            .validate()
            .map_err(SchedulerError::InvalidConfig)?;

        let engine = Arc::new(Engine::new(
            self.config,
            self.store,
            self.sink,
            self.registry,
        ));
        // Dropping the half-started scheduler closes the queues
        let scheduler = Scheduler::from_engine(Arc::clone(&engine));
        engine.start()?;

        info!(
            categories = ?scheduler.categories(),
            capture_schedule_stack = scheduler.is_capturing_schedule_stack(),
            "scheduler started"
        );
        Ok(scheduler)
    }
}

impl std::fmt::Debug for SchedulerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("config", &self.config)
            .field("store", &self.store.is_some())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Build a scheduler from configuration with default collaborators.
///
/// # Errors
///
/// Same as [`SchedulerBuilder::build`].
pub fn build_scheduler(cfg: &SchedulerConfig) -> Result<Scheduler, SchedulerError> {
    SchedulerBuilder::new(cfg.clone()).build()
}
