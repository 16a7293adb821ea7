//! Worker threads draining a category queue.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use super::{QueueInner, WorkExit};
use crate::core::scheduler::Engine;
use crate::core::{SchedulerError, WorkContext, WorkInstance};

/// Spawn a worker thread.
pub(super) fn spawn_worker(
    worker_id: usize,
    queue: Arc<QueueInner>,
    engine: Arc<Engine>,
    stack_size: usize,
) -> Result<JoinHandle<()>, SchedulerError> {
    thread::Builder::new()
        .name(format!("workq-{}-{worker_id}", queue.category))
        .stack_size(stack_size)
        .spawn(move || run(worker_id, &queue, &engine))
        .map_err(|e| SchedulerError::Internal(format!("failed to spawn worker thread: {e}")))
}

fn run(worker_id: usize, queue: &QueueInner, engine: &Arc<Engine>) {
    debug!(category = %queue.category, worker_id, "worker thread started");

    // Each worker has its own single-threaded tokio runtime
    let Some(mut rt) = build_runtime(worker_id, queue) else {
        return;
    };

    while let Some(instance) = queue.dequeue() {
        if !engine.begin_run(&instance.record) {
            debug!(
                work_id = %instance.record.id,
                state = %instance.record.state(),
                "skipping unit that left the scheduled state"
            );
            continue;
        }
        queue.counters.running.fetch_add(1, Ordering::Relaxed);
        let (instance, exit, panicked) = execute(&rt, instance, engine);
        queue.counters.running.fetch_sub(1, Ordering::Relaxed);
        engine.finish(queue, instance, exit);

        if panicked {
            // Don't reuse a runtime that unwound mid block_on
            let Some(fresh) = build_runtime(worker_id, queue) else {
                return;
            };
            rt = fresh;
        }
    }

    debug!(category = %queue.category, worker_id, "worker thread exiting");
}

fn build_runtime(worker_id: usize, queue: &QueueInner) -> Option<tokio::runtime::Runtime> {
    match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => Some(rt),
        Err(e) => {
            error!(
                category = %queue.category,
                worker_id,
                error = %e,
                "failed to create worker runtime"
            );
            None
        }
    }
}

/// Run `work()` then `clean_up()`, turning panics into failures.
fn execute(
    rt: &tokio::runtime::Runtime,
    mut instance: WorkInstance,
    engine: &Arc<Engine>,
) -> (WorkInstance, WorkExit, bool) {
    let ctx = WorkContext::new(Arc::clone(&instance.record), Arc::clone(engine));
    debug!(work_id = %instance.record.id, seq = instance.record.seq, "executing work");

    let mut panicked = false;
    let result = panic::catch_unwind(AssertUnwindSafe(|| rt.block_on(instance.work.work(&ctx))))
        .unwrap_or_else(|payload| {
            panicked = true;
            Err(anyhow::anyhow!("work panicked: {}", panic_message(payload.as_ref())))
        });
    drop(ctx);

    let ok = result.is_ok();
    let cleaned = panic::catch_unwind(AssertUnwindSafe(|| {
        instance.work.clean_up(ok, result.as_ref().err());
    }));
    if cleaned.is_err() {
        warn!(work_id = %instance.record.id, "clean_up panicked");
    }

    let exit = match result {
        Ok(()) if instance.record.is_suspended() => WorkExit::Suspended,
        Ok(()) => WorkExit::Completed,
        Err(e) => WorkExit::Failed(e),
    };
    (instance, exit, panicked)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
