//! Prioritised worker pool
//!
//! The pool executes submitted futures on a fixed roster of long-lived
//! workers. Work enters through a shared priority queue or, for targeted
//! delivery, through a worker's private queue. The pool supports:
//!
//! - Priority ordering with FIFO ties (higher priority first, then
//!   submission order)
//! - Per-worker private queues that are always drained before the shared
//!   queue, so targeted submissions are never starved by a saturated
//!   global queue
//! - Dynamic resizing (growth is eager, shrink is lazy: a worker finishes
//!   its current task before retiring)
//! - Bounded admission with a runtime-configurable depth cap
//! - Execution statistics that can be toggled off entirely
//!
//! # Example
//!
//! ```no_run
//! use neko_launcher::pool::WorkerPool;
//! use neko_launcher::types::Priority;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = WorkerPool::new(4);
//!
//! let handle = pool.submit(async { 2 + 2 })?;
//! assert_eq!(handle.join().await?, 4);
//!
//! let urgent = pool.submit_with_priority(Priority::Critical, async { "now" })?;
//! assert_eq!(urgent.join().await?, "now");
//!
//! pool.stop(true).await;
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::types::{Priority, TaskId, WorkerId};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::BinaryHeap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{Notify, mpsc, oneshot};

/// Default cap on the shared queue depth
const DEFAULT_MAX_QUEUE_DEPTH: usize = 100_000;

/// A handle to a submitted task's eventual result
///
/// Dropping the handle abandons the result but not the task: the task still
/// runs (or is reported as discarded if it was rejected at submission).
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: TaskId,
    rx: oneshot::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// The id assigned to the task at submission
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Wait for the task to finish and take its output
    ///
    /// # Errors
    /// Returns [`Error::TaskFailed`] if the task panicked or the pool was
    /// stopped before the task ran.
    pub async fn join(self) -> Result<T> {
        self.rx.await.map_err(|_| Error::TaskFailed)
    }
}

/// Snapshot of the pool's counters
///
/// `total` is `submitted + discarded`; `avg_execution` is
/// `total_execution / completed` and zero while nothing has completed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskStats {
    /// Tasks currently executing
    pub active: u64,
    /// Tasks accepted into a queue
    pub submitted: u64,
    /// Tasks rejected at admission
    pub discarded: u64,
    /// Tasks that ran to completion
    pub completed: u64,
    /// Tasks that panicked
    pub failed: u64,
    /// `submitted + discarded`
    pub total: u64,
    /// Sum of execution times of completed tasks
    pub total_execution: Duration,
    /// Longest single execution
    pub max_execution: Duration,
    /// `total_execution / completed`
    pub avg_execution: Duration,
}

/// A queued unit of work
struct QueuedTask {
    id: TaskId,
    priority: Priority,
    /// Resolves to `true` when the task ran without panicking
    future: BoxFuture<'static, bool>,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    /// Max-heap order: higher priority first, then lower id (FIFO) first
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.id.0.cmp(&self.id.0))
    }
}

struct WorkerHandle {
    id: WorkerId,
    private_tx: mpsc::UnboundedSender<QueuedTask>,
    exit: Arc<AtomicBool>,
    join: tokio::task::JoinHandle<()>,
}

#[derive(Default)]
struct Timing {
    total: Duration,
    max: Duration,
}

struct PoolInner {
    shared: Mutex<BinaryHeap<QueuedTask>>,
    queue_notify: Notify,
    completion: Notify,
    workers: Mutex<Vec<WorkerHandle>>,
    next_task_id: AtomicU64,
    next_worker_id: AtomicU64,
    max_queue_depth: AtomicUsize,
    stopped: AtomicBool,

    // Counters; `queued` covers both the shared and the private queues.
    queued: AtomicU64,
    active: AtomicU64,
    submitted: AtomicU64,
    discarded: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    stats_enabled: AtomicBool,
    timing: RwLock<Timing>,
}

impl PoolInner {
    /// Pop the highest-priority shared task, waking a sibling if more remain
    fn pop_shared(&self) -> Option<QueuedTask> {
        let mut queue = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        let task = queue.pop();
        if task.is_some() && !queue.is_empty() {
            self.queue_notify.notify_one();
        }
        task
    }

    fn retire_worker(&self, id: WorkerId) {
        self.workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|w| w.id != id);
    }

    async fn run_task(&self, task: QueuedTask) {
        self.queued.fetch_sub(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);

        let start = Instant::now();
        let ok = task.future.await;
        if ok {
            self.completed.fetch_add(1, Ordering::SeqCst);
            if self.stats_enabled.load(Ordering::Relaxed) {
                let elapsed = start.elapsed();
                let mut timing = self.timing.write().unwrap_or_else(|e| e.into_inner());
                timing.total += elapsed;
                if elapsed > timing.max {
                    timing.max = elapsed;
                }
            }
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
            tracing::error!(task_id = task.id.get(), "task panicked during execution");
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completion.notify_waiters();
    }

    fn is_idle(&self) -> bool {
        self.queued.load(Ordering::SeqCst) == 0 && self.active.load(Ordering::SeqCst) == 0
    }
}

async fn worker_loop(
    inner: Arc<PoolInner>,
    id: WorkerId,
    exit: Arc<AtomicBool>,
    mut private_rx: mpsc::UnboundedReceiver<QueuedTask>,
) {
    loop {
        if inner.stopped.load(Ordering::Acquire) {
            break;
        }
        if exit.load(Ordering::Acquire) {
            inner.retire_worker(id);
            tracing::debug!(worker = id.get(), "worker retired");
            return;
        }

        // Private queue first, then the shared priority queue.
        let task = match private_rx.try_recv() {
            Ok(task) => Some(task),
            Err(_) => inner.pop_shared(),
        };

        match task {
            Some(task) => inner.run_task(task).await,
            None => {
                tokio::select! {
                    biased;
                    maybe = private_rx.recv() => {
                        match maybe {
                            Some(task) => inner.run_task(task).await,
                            None => break,
                        }
                    }
                    _ = inner.queue_notify.notified() => {}
                }
            }
        }
    }
    tracing::debug!(worker = id.get(), "worker stopping");
}

/// Concurrent task executor with priority ordering and targeted delivery
///
/// Cloning is cheap; all clones share the same pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Create a pool with `worker_count` workers (at least one)
    pub fn new(worker_count: usize) -> Self {
        let inner = Arc::new(PoolInner {
            shared: Mutex::new(BinaryHeap::new()),
            queue_notify: Notify::new(),
            completion: Notify::new(),
            workers: Mutex::new(Vec::new()),
            next_task_id: AtomicU64::new(0),
            next_worker_id: AtomicU64::new(0),
            max_queue_depth: AtomicUsize::new(DEFAULT_MAX_QUEUE_DEPTH),
            stopped: AtomicBool::new(false),
            queued: AtomicU64::new(0),
            active: AtomicU64::new(0),
            submitted: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            stats_enabled: AtomicBool::new(true),
            timing: RwLock::new(Timing::default()),
        });

        let pool = Self { inner };
        for _ in 0..worker_count.max(1) {
            pool.spawn_worker();
        }
        pool
    }

    /// Create a pool sized to the machine's available parallelism
    pub fn with_default_size() -> Self {
        let count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(count)
    }

    fn spawn_worker(&self) {
        let id = WorkerId::new(self.inner.next_worker_id.fetch_add(1, Ordering::SeqCst));
        let (private_tx, private_rx) = mpsc::unbounded_channel();
        let exit = Arc::new(AtomicBool::new(false));
        let join = tokio::spawn(worker_loop(
            self.inner.clone(),
            id,
            exit.clone(),
            private_rx,
        ));
        self.inner
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(WorkerHandle {
                id,
                private_tx,
                exit,
                join,
            });
    }

    fn make_task<F, T>(&self, priority: Priority, future: F) -> (QueuedTask, TaskHandle<T>)
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let id = TaskId::new(self.inner.next_task_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        let future = async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(value) => {
                    let _ = tx.send(value);
                    true
                }
                Err(_) => false,
            }
        }
        .boxed();
        (
            QueuedTask {
                id,
                priority,
                future,
            },
            TaskHandle { id, rx },
        )
    }

    /// Submit a task with [`Priority::Normal`]
    ///
    /// # Errors
    /// [`Error::PoolStopped`] if the pool is shutting down, [`Error::QueueFull`]
    /// if the shared queue is at its depth cap. Either rejection increments the
    /// *discarded* counter.
    pub fn submit<F, T>(&self, future: F) -> Result<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit_with_priority(Priority::Normal, future)
    }

    /// Submit a task with an explicit priority
    ///
    /// # Errors
    /// Same as [`WorkerPool::submit`].
    pub fn submit_with_priority<F, T>(&self, priority: Priority, future: F) -> Result<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.inner.stopped.load(Ordering::Acquire) {
            self.inner.discarded.fetch_add(1, Ordering::SeqCst);
            return Err(Error::PoolStopped);
        }

        let (task, handle) = self.make_task(priority, future);
        {
            let mut queue = self.inner.shared.lock().unwrap_or_else(|e| e.into_inner());
            let cap = self.inner.max_queue_depth.load(Ordering::Relaxed);
            if queue.len() >= cap {
                self.inner.discarded.fetch_add(1, Ordering::SeqCst);
                return Err(Error::QueueFull { depth: queue.len() });
            }
            queue.push(task);
        }
        self.inner.submitted.fetch_add(1, Ordering::SeqCst);
        self.inner.queued.fetch_add(1, Ordering::SeqCst);
        self.inner.queue_notify.notify_one();
        Ok(handle)
    }

    /// Submit a task to a specific worker's private queue
    ///
    /// Private-queue tasks are always dispatched before the worker looks at
    /// the shared queue.
    ///
    /// # Errors
    /// [`Error::PoolStopped`] if the pool is shutting down,
    /// [`Error::WorkerNotFound`] if `worker` is not in the roster.
    pub fn submit_to_worker<F, T>(&self, worker: WorkerId, future: F) -> Result<TaskHandle<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.inner.stopped.load(Ordering::Acquire) {
            self.inner.discarded.fetch_add(1, Ordering::SeqCst);
            return Err(Error::PoolStopped);
        }

        let (task, handle) = self.make_task(Priority::Normal, future);
        let workers = self.inner.workers.lock().unwrap_or_else(|e| e.into_inner());
        let target = workers
            .iter()
            .find(|w| w.id == worker && !w.exit.load(Ordering::Acquire));
        match target {
            Some(w) if w.private_tx.send(task).is_ok() => {
                self.inner.submitted.fetch_add(1, Ordering::SeqCst);
                self.inner.queued.fetch_add(1, Ordering::SeqCst);
                Ok(handle)
            }
            _ => {
                self.inner.discarded.fetch_add(1, Ordering::SeqCst);
                Err(Error::WorkerNotFound { id: worker })
            }
        }
    }

    /// Grow or shrink the roster
    ///
    /// Growth spawns workers immediately. Shrinking marks the trailing
    /// workers for exit; each finishes its current task first, so the public
    /// count converges rather than snapping.
    pub fn set_worker_count(&self, count: usize) {
        let count = count.max(1);
        let to_mark: Vec<_> = {
            let workers = self.inner.workers.lock().unwrap_or_else(|e| e.into_inner());
            let current: Vec<_> = workers
                .iter()
                .filter(|w| !w.exit.load(Ordering::Acquire))
                .map(|w| w.id)
                .collect();
            if current.len() >= count {
                current[count..].to_vec()
            } else {
                Vec::new()
            }
        };

        if to_mark.is_empty() {
            let current = self.worker_count();
            for _ in current..count {
                self.spawn_worker();
            }
            return;
        }

        {
            let workers = self.inner.workers.lock().unwrap_or_else(|e| e.into_inner());
            for w in workers.iter() {
                if to_mark.contains(&w.id) {
                    w.exit.store(true, Ordering::Release);
                }
            }
        }
        self.inner.queue_notify.notify_waiters();
    }

    /// Number of active (not exit-marked) workers
    pub fn worker_count(&self) -> usize {
        self.inner
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|w| !w.exit.load(Ordering::Acquire))
            .count()
    }

    /// Ids of the active workers, in spawn order
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.inner
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|w| !w.exit.load(Ordering::Acquire))
            .map(|w| w.id)
            .collect()
    }

    /// Wait until every queue is empty and no task is running
    ///
    /// Returns `false` if `timeout` elapsed first. `None` waits forever.
    pub async fn wait_for_all(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        loop {
            if self.inner.is_idle() {
                return true;
            }
            let notified = self.inner.completion.notified();
            tokio::pin!(notified);
            if self.inner.is_idle() {
                return true;
            }
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, &mut notified)
                        .await
                        .is_err()
                    {
                        return self.inner.is_idle();
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Stop the pool
    ///
    /// New submissions are rejected immediately. With `wait_for_completion`
    /// the call joins every worker (each finishes its in-flight task);
    /// otherwise workers are detached and wind down on their own. Idempotent.
    pub async fn stop(&self, wait_for_completion: bool) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.queue_notify.notify_waiters();

        let handles: Vec<WorkerHandle> = self
            .inner
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        if wait_for_completion {
            for handle in handles {
                let _ = handle.join.await;
            }
        }
        // Dropping unawaited handles detaches the workers.
    }

    /// Whether [`WorkerPool::stop`] has been called
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Change the shared-queue depth cap; applies to future admissions only
    pub fn set_max_queue_depth(&self, depth: usize) {
        self.inner.max_queue_depth.store(depth, Ordering::Relaxed);
    }

    /// Enable or disable execution-time bookkeeping
    ///
    /// Counters are always maintained; only the timing math is skipped.
    pub fn set_stats_enabled(&self, enabled: bool) {
        self.inner.stats_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Snapshot the pool's statistics
    pub fn stats(&self) -> TaskStats {
        let submitted = self.inner.submitted.load(Ordering::SeqCst);
        let discarded = self.inner.discarded.load(Ordering::SeqCst);
        let completed = self.inner.completed.load(Ordering::SeqCst);
        let timing = self.inner.timing.read().unwrap_or_else(|e| e.into_inner());
        let avg = if completed > 0 {
            timing.total / completed as u32
        } else {
            Duration::ZERO
        };
        TaskStats {
            active: self.inner.active.load(Ordering::SeqCst),
            submitted,
            discarded,
            completed,
            failed: self.inner.failed.load(Ordering::SeqCst),
            total: submitted + discarded,
            total_execution: timing.total,
            max_execution: timing.max,
            avg_execution: avg,
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_submit_returns_result() {
        let pool = WorkerPool::new(2);
        let handle = pool.submit(async { 21 * 2 }).unwrap();
        assert_eq!(handle.join().await.unwrap(), 42);
        pool.stop(true).await;
    }

    #[tokio::test]
    async fn test_priority_order_with_single_worker() {
        // One worker, first task holds the worker busy while the rest queue
        // up; the Critical task must dispatch before the queued Normal ones.
        let pool = WorkerPool::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let gate = Arc::new(Notify::new());
        let gate_open = gate.clone();
        let first = pool
            .submit(async move {
                gate_open.notified().await;
            })
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..5 {
            let order = order.clone();
            handles.push(
                pool.submit(async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    order.lock().unwrap().push(format!("normal-{i}"));
                })
                .unwrap(),
            );
        }
        let order_c = order.clone();
        let critical = pool
            .submit_with_priority(Priority::Critical, async move {
                order_c.lock().unwrap().push("critical".to_string());
            })
            .unwrap();

        gate.notify_one();
        first.join().await.unwrap();
        critical.join().await.unwrap();
        for handle in handles {
            handle.join().await.unwrap();
        }

        let order = order.lock().unwrap().clone();
        assert_eq!(order[0], "critical", "critical should run first: {order:?}");

        let stats = pool.stats();
        assert_eq!(stats.completed, 7);
        assert_eq!(stats.failed, 0);
        pool.stop(true).await;
    }

    #[tokio::test]
    async fn test_fifo_within_priority() {
        let pool = WorkerPool::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let gate = Arc::new(Notify::new());
        let gate_open = gate.clone();
        let first = pool
            .submit(async move {
                gate_open.notified().await;
            })
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..4 {
            let order = order.clone();
            handles.push(
                pool.submit_with_priority(Priority::High, async move {
                    order.lock().unwrap().push(i);
                })
                .unwrap(),
            );
        }
        gate.notify_one();
        first.join().await.unwrap();
        for handle in handles {
            handle.join().await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
        pool.stop(true).await;
    }

    #[tokio::test]
    async fn test_private_queue_precedence() {
        let pool = WorkerPool::new(1);
        let worker = pool.worker_ids()[0];
        let order = Arc::new(Mutex::new(Vec::new()));

        let gate = Arc::new(Notify::new());
        let gate_open = gate.clone();
        let first = pool
            .submit(async move {
                gate_open.notified().await;
            })
            .unwrap();

        // Shared task queued first, then a targeted one; the targeted task
        // must still run first because the private queue is drained first.
        let order_a = order.clone();
        let shared = pool
            .submit(async move {
                order_a.lock().unwrap().push("shared");
            })
            .unwrap();
        let order_b = order.clone();
        let private = pool
            .submit_to_worker(worker, async move {
                order_b.lock().unwrap().push("private");
            })
            .unwrap();

        gate.notify_one();
        first.join().await.unwrap();
        private.join().await.unwrap();
        shared.join().await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["private", "shared"]);
        pool.stop(true).await;
    }

    #[tokio::test]
    async fn test_submit_to_unknown_worker() {
        let pool = WorkerPool::new(1);
        let err = pool
            .submit_to_worker(WorkerId::new(999), async {})
            .unwrap_err();
        assert!(matches!(err, Error::WorkerNotFound { id } if id.get() == 999));
        assert_eq!(pool.stats().discarded, 1);
        pool.stop(true).await;
    }

    #[tokio::test]
    async fn test_queue_full_rejects_newest() {
        let pool = WorkerPool::new(1);
        pool.set_max_queue_depth(2);

        let gate = Arc::new(Notify::new());
        let gate_open = gate.clone();
        let first = pool
            .submit(async move {
                gate_open.notified().await;
            })
            .unwrap();

        let _a = pool.submit(async {}).unwrap();
        let _b = pool.submit(async {}).unwrap();
        let err = pool.submit(async {}).unwrap_err();
        assert!(matches!(err, Error::QueueFull { .. }));

        let stats = pool.stats();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.total, stats.submitted + stats.discarded);

        gate.notify_one();
        first.join().await.unwrap();
        pool.stop(true).await;
    }

    #[tokio::test]
    async fn test_panic_counts_as_failed_and_worker_survives() {
        let pool = WorkerPool::new(1);
        let handle = pool.submit(async { panic!("boom") }).unwrap();
        assert!(matches!(handle.join().await, Err(Error::TaskFailed)));

        // The worker must still be able to run tasks afterwards.
        let ok = pool.submit(async { 7 }).unwrap();
        assert_eq!(ok.join().await.unwrap(), 7);

        let stats = pool.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 1);
        pool.stop(true).await;
    }

    #[tokio::test]
    async fn test_stop_rejects_new_submissions() {
        let pool = WorkerPool::new(2);
        pool.stop(true).await;
        let err = pool.submit(async {}).unwrap_err();
        assert!(matches!(err, Error::PoolStopped));
        // Idempotent
        pool.stop(true).await;
    }

    #[tokio::test]
    async fn test_resize_grow_and_shrink() {
        let pool = WorkerPool::new(2);
        assert_eq!(pool.worker_count(), 2);

        pool.set_worker_count(4);
        assert_eq!(pool.worker_count(), 4);

        pool.set_worker_count(1);
        // Marked workers retire lazily; the public count excludes them at once.
        assert_eq!(pool.worker_count(), 1);

        // The remaining worker still executes work.
        let handle = pool.submit(async { "alive" }).unwrap();
        assert_eq!(handle.join().await.unwrap(), "alive");
        pool.stop(true).await;
    }

    #[tokio::test]
    async fn test_wait_for_all() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..8 {
            let counter = counter.clone();
            let _ = pool
                .submit(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        assert!(pool.wait_for_all(Some(Duration::from_secs(5))).await);
        assert_eq!(counter.load(Ordering::SeqCst), 8);
        pool.stop(true).await;
    }

    #[tokio::test]
    async fn test_wait_for_all_times_out() {
        let pool = WorkerPool::new(1);
        let gate = Arc::new(Notify::new());
        let gate_open = gate.clone();
        let slow = pool
            .submit(async move {
                gate_open.notified().await;
            })
            .unwrap();

        assert!(!pool.wait_for_all(Some(Duration::from_millis(50))).await);
        gate.notify_one();
        slow.join().await.unwrap();
        pool.stop(true).await;
    }

    #[tokio::test]
    async fn test_stats_toggle_skips_timing() {
        let pool = WorkerPool::new(1);
        pool.set_stats_enabled(false);
        let handle = pool
            .submit(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
            })
            .unwrap();
        handle.join().await.unwrap();

        let stats = pool.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.total_execution, Duration::ZERO);
        pool.stop(true).await;
    }
}
