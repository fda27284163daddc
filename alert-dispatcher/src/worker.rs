//! Dispatch worker pool.
//!
//! A fixed number of tokio tasks drain the [`DispatchQueue`]. For each task a
//! worker walks the task's backend registry in order and awaits every
//! backend's `dispatch`. Delivery errors are logged and counted, never
//! retried or escalated; a panicking backend is caught so the worker keeps
//! running.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::backend::Backend;
use crate::error::ConfigError;
use crate::queue::{DispatchQueue, DispatchTask};

/// Counters shared by all workers of a pool.
#[derive(Debug, Default)]
pub struct WorkerStats {
    tasks_processed: AtomicU64,
    delivery_errors: AtomicU64,
    backend_panics: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub tasks_processed: u64,
    pub delivery_errors: u64,
    pub backend_panics: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            tasks_processed: self.tasks_processed.load(Ordering::SeqCst),
            delivery_errors: self.delivery_errors.load(Ordering::SeqCst),
            backend_panics: self.backend_panics.load(Ordering::SeqCst),
        }
    }
}

/// Fixed-size pool of dispatch workers.
pub struct WorkerPool {
    queue: DispatchQueue,
    worker_count: usize,
    stats: Arc<WorkerStats>,
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    started: bool,
}

impl WorkerPool {
    /// Create a pool of `worker_count` workers (at least one) over `queue`.
    pub fn new(queue: DispatchQueue, worker_count: usize) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            queue,
            worker_count: worker_count.max(1),
            stats: Arc::new(WorkerStats::default()),
            shutdown_tx,
            handles: Vec::new(),
            started: false,
        }
    }

    /// Spawn the workers. Must be called exactly once, inside a tokio runtime.
    pub fn start(&mut self) -> Result<(), ConfigError> {
        if self.started {
            return Err(ConfigError::PoolAlreadyStarted);
        }
        self.started = true;

        info!(worker_count = self.worker_count, "worker_pool_starting");

        for worker_id in 0..self.worker_count {
            let queue = self.queue.clone();
            let stats = Arc::clone(&self.stats);
            let shutdown_rx = self.shutdown_tx.subscribe();

            self.handles.push(tokio::spawn(run_worker(
                worker_id,
                queue,
                stats,
                shutdown_rx,
            )));
        }

        info!(spawned_workers = self.handles.len(), "worker_pool_started");
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop claiming new tasks and wait for in-flight ones.
    ///
    /// Workers finish the task they are running; tasks still queued are
    /// dropped. Workers that do not stop within `timeout` are aborted.
    /// Returns `true` when every worker stopped on its own.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        info!(
            worker_count = self.handles.len(),
            queued = self.queue.len(),
            timeout_seconds = timeout.as_secs(),
            "worker_pool_stopping"
        );

        self.shutdown_tx.send_replace(true);

        let deadline = tokio::time::Instant::now() + timeout;
        let mut clean = true;

        for (worker_id, mut handle) in self.handles.into_iter().enumerate() {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(join_error)) => {
                    error!(worker_id, error = %join_error, "worker_join_failed");
                    clean = false;
                }
                Err(_elapsed) => {
                    warn!(worker_id, "worker_shutdown_timeout");
                    handle.abort();
                    clean = false;
                }
            }
        }

        info!(clean, "worker_pool_stopped");
        clean
    }
}

async fn run_worker(
    worker_id: usize,
    queue: DispatchQueue,
    stats: Arc<WorkerStats>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(worker_id, "worker_started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let task = tokio::select! {
            biased;
            // Fires on shutdown, or when the pool is dropped without one.
            _ = shutdown_rx.changed() => break,
            task = queue.pop() => task,
        };

        match task {
            Some(task) => process_task(worker_id, &task, &stats).await,
            None => {
                warn!(worker_id, "dispatch_queue_closed");
                break;
            }
        }
    }

    info!(worker_id, "worker_stopped");
}

/// Run every backend of the task's registry, in order, over its events.
async fn process_task(worker_id: usize, task: &DispatchTask, stats: &WorkerStats) {
    info!(
        worker_id,
        events = task.events().len(),
        backends = task.registry().len(),
        "worker_task_received"
    );

    let mut failed = 0usize;

    for backend in task.registry().iter() {
        // The call itself may panic before it yields a future, so it runs
        // inside the guarded block.
        let dispatch =
            AssertUnwindSafe(async { backend.dispatch(task.events()).await }).catch_unwind();

        match dispatch.await {
            Ok(errors) => {
                for e in &errors {
                    warn!(
                        worker_id,
                        backend = backend.name(),
                        error = %e,
                        "backend_delivery_failed"
                    );
                }
                failed += errors.len();
                stats
                    .delivery_errors
                    .fetch_add(errors.len() as u64, Ordering::SeqCst);
            }
            Err(_panic) => {
                error!(worker_id, backend = backend.name(), "backend_dispatch_panicked");
                stats.backend_panics.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    stats.tasks_processed.fetch_add(1, Ordering::SeqCst);
    info!(worker_id, delivery_errors = failed, "worker_task_completed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendRegistry;
    use crate::error::DeliveryError;
    use crate::event::Event;
    use futures::future::BoxFuture;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every event it is handed; optionally fails or panics.
    struct Recorder {
        name: &'static str,
        seen: Mutex<Vec<u64>>,
        fail: bool,
        panic: bool,
    }

    /// Panics while building its dispatch future, before anything is awaited.
    struct EagerPanic;

    impl Backend for EagerPanic {
        fn name(&self) -> &str {
            "eager"
        }

        fn dispatch<'a>(&'a self, events: &'a [Event]) -> BoxFuture<'a, Vec<DeliveryError>> {
            let _missing = &events[5];
            async { Vec::new() }.boxed()
        }

        fn close(&self) -> BoxFuture<'_, ()> {
            async {}.boxed()
        }
    }

    impl Recorder {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                seen: Mutex::new(Vec::new()),
                fail: false,
                panic: false,
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                seen: Mutex::new(Vec::new()),
                fail: true,
                panic: false,
            })
        }

        fn panicking(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                seen: Mutex::new(Vec::new()),
                fail: false,
                panic: true,
            })
        }

        fn seen(&self) -> Vec<u64> {
            let mut seen = self.seen.lock().unwrap().clone();
            seen.sort_unstable();
            seen
        }
    }

    impl Backend for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn dispatch<'a>(&'a self, events: &'a [Event]) -> BoxFuture<'a, Vec<DeliveryError>> {
            async move {
                if self.panic {
                    panic!("backend exploded");
                }
                let mut errors = Vec::new();
                for event in events {
                    let id = event.fields()["id"].as_u64().unwrap();
                    self.seen.lock().unwrap().push(id);
                    if self.fail {
                        errors.push(DeliveryError::new(format!("failed {}", id)));
                    }
                }
                errors
            }
            .boxed()
        }

        fn close(&self) -> BoxFuture<'_, ()> {
            async {}.boxed()
        }
    }

    fn event(id: u64) -> Event {
        serde_json::from_value(json!({ "id": id })).unwrap()
    }

    async fn wait_for_tasks(pool: &WorkerPool, count: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while pool.stats().tasks_processed < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("tasks were not processed in time");
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut pool = WorkerPool::new(DispatchQueue::unbounded(), 1);

        assert!(pool.start().is_ok());
        assert_eq!(pool.start(), Err(ConfigError::PoolAlreadyStarted));
        assert!(pool.is_started());

        pool.shutdown(Duration::from_secs(1)).await;
    }

    #[test]
    fn test_worker_count_minimum() {
        let pool = WorkerPool::new(DispatchQueue::unbounded(), 0);
        assert_eq!(pool.worker_count(), 1);
        assert!(!pool.is_started());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_each_task_reaches_every_backend_once() {
        let first = Recorder::new("first");
        let second = Recorder::new("second");
        let backends: Vec<Arc<dyn Backend>> = vec![first.clone(), second.clone()];
        let registry = Arc::new(BackendRegistry::new(backends).unwrap());

        let queue = DispatchQueue::unbounded();
        let mut pool = WorkerPool::new(queue.clone(), 3);
        pool.start().unwrap();

        for i in 0..20 {
            queue
                .push(DispatchTask::new(Arc::clone(&registry), vec![event(i)]))
                .unwrap();
        }

        wait_for_tasks(&pool, 20).await;

        let expected: Vec<u64> = (0..20).collect();
        assert_eq!(first.seen(), expected);
        assert_eq!(second.seen(), expected);
        assert_eq!(pool.stats().delivery_errors, 0);

        assert!(pool.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_delivery_errors_do_not_stop_worker() {
        let failing = Recorder::failing("failing");
        let healthy = Recorder::new("healthy");
        let backends: Vec<Arc<dyn Backend>> = vec![failing.clone(), healthy.clone()];
        let registry = Arc::new(BackendRegistry::new(backends).unwrap());

        let queue = DispatchQueue::unbounded();
        let mut pool = WorkerPool::new(queue.clone(), 1);
        pool.start().unwrap();

        for i in 0..3 {
            queue
                .push(DispatchTask::new(Arc::clone(&registry), vec![event(i)]))
                .unwrap();
        }

        wait_for_tasks(&pool, 3).await;

        assert_eq!(failing.seen(), vec![0, 1, 2]);
        assert_eq!(healthy.seen(), vec![0, 1, 2]);
        assert_eq!(pool.stats().delivery_errors, 3);

        pool.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_panicking_backend_is_isolated() {
        let exploding = Recorder::panicking("exploding");
        let healthy = Recorder::new("healthy");
        let backends: Vec<Arc<dyn Backend>> = vec![exploding, healthy.clone()];
        let registry = Arc::new(BackendRegistry::new(backends).unwrap());

        let queue = DispatchQueue::unbounded();
        let mut pool = WorkerPool::new(queue.clone(), 1);
        pool.start().unwrap();

        queue
            .push(DispatchTask::new(Arc::clone(&registry), vec![event(1)]))
            .unwrap();
        queue
            .push(DispatchTask::new(Arc::clone(&registry), vec![event(2)]))
            .unwrap();

        wait_for_tasks(&pool, 2).await;

        assert_eq!(healthy.seen(), vec![1, 2]);
        assert_eq!(pool.stats().backend_panics, 2);

        assert!(pool.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_backend_panicking_before_future_is_isolated() {
        let healthy = Recorder::new("healthy");
        let backends: Vec<Arc<dyn Backend>> = vec![Arc::new(EagerPanic), healthy.clone()];
        let registry = Arc::new(BackendRegistry::new(backends).unwrap());

        let queue = DispatchQueue::unbounded();
        let mut pool = WorkerPool::new(queue.clone(), 1);
        pool.start().unwrap();

        for i in 0..3 {
            queue
                .push(DispatchTask::new(Arc::clone(&registry), vec![event(i)]))
                .unwrap();
        }

        wait_for_tasks(&pool, 3).await;

        assert_eq!(healthy.seen(), vec![0, 1, 2]);
        assert_eq!(pool.stats().backend_panics, 3);
        assert!(queue.is_empty());

        assert!(pool.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_workers() {
        let mut pool = WorkerPool::new(DispatchQueue::unbounded(), 4);
        pool.start().unwrap();

        assert!(pool.shutdown(Duration::from_secs(1)).await);
    }
}
