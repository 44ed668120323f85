use crate::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Priority levels for background tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskPriority {
    /// Low priority - can be delayed significantly
    Low = 1,
    /// Normal priority - standard background processing
    Normal = 2,
    /// High priority - work the current frame is waiting on
    High = 3,
    /// Critical priority - immediate processing needed
    Critical = 4,
}

/// Unique identifier for background tasks
pub type TaskId = u64;

/// Result of a completed background task
#[derive(Debug)]
pub struct TaskResult<T> {
    pub task_id: TaskId,
    pub result: Result<T>,
}

type Job<T> = Box<dyn FnOnce() -> Result<T> + Send + 'static>;

/// Internal wrapper for prioritized tasks
struct PrioritizedTask<T> {
    id: TaskId,
    job: Job<T>,
    priority: TaskPriority,
    submitted_at: Instant,
}

impl<T> PartialEq for PrioritizedTask<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.id == other.id
    }
}

impl<T> Eq for PrioritizedTask<T> {}

impl<T> PartialOrd for PrioritizedTask<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for PrioritizedTask<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier submission
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.id.cmp(&self.id),
            other => other,
        }
    }
}

/// Configuration for the background task manager
#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    /// Number of worker threads
    pub num_threads: usize,
    /// Maximum number of queued tasks before the lowest priority one is dropped
    pub max_queue_size: usize,
    /// Test mode - tasks execute synchronously on submission
    pub test_mode: bool,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            num_threads: 4,
            max_queue_size: 1000,
            test_mode: false,
        }
    }
}

struct Shared<T> {
    queue: Mutex<BinaryHeap<PrioritizedTask<T>>>,
    available: Condvar,
    shutdown: AtomicBool,
    running: AtomicUsize,
}

/// Runs closures on a fixed pool of worker threads, highest priority first,
/// and hands their results back over a channel.
pub struct BackgroundTaskManager<T: Send + 'static> {
    config: TaskManagerConfig,
    shared: Arc<Shared<T>>,
    result_tx: Sender<TaskResult<T>>,
    result_rx: Receiver<TaskResult<T>>,
    workers: Vec<JoinHandle<()>>,
    next_id: AtomicU64,
}

impl<T: Send + 'static> BackgroundTaskManager<T> {
    pub fn new(config: TaskManagerConfig) -> Self {
        let (result_tx, result_rx) = unbounded();
        let shared = Arc::new(Shared {
            queue: Mutex::new(BinaryHeap::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            running: AtomicUsize::new(0),
        });

        let workers = if config.test_mode {
            log::debug!("task manager in test mode, tasks run on submission");
            Vec::new()
        } else {
            let threads = config.num_threads.max(1);
            log::debug!("starting {} background workers", threads);
            (0..threads)
                .filter_map(|index| {
                    let shared = shared.clone();
                    let result_tx = result_tx.clone();
                    std::thread::Builder::new()
                        .name(format!("terrakit-worker-{}", index))
                        .spawn(move || Self::worker_loop(shared, result_tx))
                        .map_err(|e| log::error!("failed to spawn worker {}: {}", index, e))
                        .ok()
                })
                .collect()
        };

        Self {
            config,
            shared,
            result_tx,
            result_rx,
            workers,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn with_default_config() -> Self {
        Self::new(TaskManagerConfig::default())
    }

    /// A manager that runs every task synchronously inside `submit`.
    pub fn for_testing() -> Self {
        Self::new(TaskManagerConfig {
            test_mode: true,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &TaskManagerConfig {
        &self.config
    }

    /// Queues `job`. Its result arrives through [`try_recv_results`].
    ///
    /// [`try_recv_results`]: Self::try_recv_results
    pub fn submit<F>(&self, priority: TaskPriority, job: F) -> Result<TaskId>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        if self.is_shutting_down() {
            return Err(Error::Task("task manager is shut down".into()));
        }

        let id = self.next_id.fetch_add(1, AtomicOrdering::Relaxed);
        if self.config.test_mode || self.workers.is_empty() {
            let result = run_job(Box::new(job));
            self.result_tx
                .send(TaskResult { task_id: id, result })
                .map_err(|_| Error::Task("result channel closed".into()))?;
            return Ok(id);
        }

        {
            let mut queue = self.shared.queue.lock();
            queue.push(PrioritizedTask {
                id,
                job: Box::new(job),
                priority,
                submitted_at: Instant::now(),
            });

            // Evict the lowest priority, newest task when over capacity. Its
            // submitter still gets a result so it can retry.
            if queue.len() > self.config.max_queue_size {
                let mut tasks = std::mem::take(&mut *queue).into_vec();
                if let Some(lowest) = tasks
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.cmp(b.1))
                    .map(|(index, _)| index)
                {
                    let dropped = tasks.swap_remove(lowest);
                    log::debug!(
                        "task queue full, evicting task {} queued {:?} ago",
                        dropped.id,
                        dropped.submitted_at.elapsed()
                    );
                    let _ = self.result_tx.send(TaskResult {
                        task_id: dropped.id,
                        result: Err(Error::Task(format!("task {} evicted from a full queue", dropped.id))),
                    });
                }
                *queue = tasks.into();
            }
        }
        self.shared.available.notify_one();
        Ok(id)
    }

    /// Stops the workers once the tasks already running finish. Queued
    /// tasks are discarded.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, AtomicOrdering::SeqCst);
        self.shared.queue.lock().clear();
        self.shared.available.notify_all();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutdown.load(AtomicOrdering::SeqCst)
    }

    /// Completed results, without blocking.
    pub fn try_recv_results(&self) -> Vec<TaskResult<T>> {
        self.result_rx.try_iter().collect()
    }

    /// Waits up to `timeout` for one result.
    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<TaskResult<T>> {
        match self.result_rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn has_pending_results(&self) -> bool {
        !self.result_rx.is_empty()
    }

    pub fn queued_tasks(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn running_tasks(&self) -> usize {
        self.shared.running.load(AtomicOrdering::Acquire)
    }

    /// Whether nothing is queued or running. Results may still be waiting.
    pub fn is_idle(&self) -> bool {
        self.queued_tasks() == 0 && self.running_tasks() == 0
    }

    fn worker_loop(shared: Arc<Shared<T>>, result_tx: Sender<TaskResult<T>>) {
        loop {
            let task = {
                let mut queue = shared.queue.lock();
                loop {
                    if shared.shutdown.load(AtomicOrdering::SeqCst) {
                        return;
                    }
                    if let Some(task) = queue.pop() {
                        // Counted before the lock is released so `is_idle` never
                        // sees the task in neither state.
                        shared.running.fetch_add(1, AtomicOrdering::AcqRel);
                        break task;
                    }
                    shared.available.wait(&mut queue);
                }
            };

            let result = run_job(task.job);
            let sent = result_tx.send(TaskResult {
                task_id: task.id,
                result,
            });
            shared.running.fetch_sub(1, AtomicOrdering::AcqRel);
            if sent.is_err() {
                return;
            }
        }
    }
}

impl<T: Send + 'static> Drop for BackgroundTaskManager<T> {
    fn drop(&mut self) {
        self.shutdown();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for BackgroundTaskManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTaskManager")
            .field("config", &self.config)
            .field("workers", &self.workers.len())
            .field("queued", &self.queued_tasks())
            .field("running", &self.running_tasks())
            .finish()
    }
}

fn run_job<T>(job: Job<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|panic| {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(Error::Task(format!("task panicked: {}", message)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        let mut heap: BinaryHeap<PrioritizedTask<u32>> = BinaryHeap::new();
        for (id, priority) in [
            (0, TaskPriority::Low),
            (1, TaskPriority::High),
            (2, TaskPriority::Normal),
            (3, TaskPriority::High),
        ] {
            heap.push(PrioritizedTask {
                id,
                job: Box::new(move || Ok(id as u32)),
                priority,
                submitted_at: Instant::now(),
            });
        }

        let order: Vec<TaskId> = std::iter::from_fn(|| heap.pop().map(|t| t.id)).collect();
        assert_eq!(order, vec![1, 3, 2, 0]);
    }

    #[test]
    fn test_synchronous_mode() {
        let manager = BackgroundTaskManager::for_testing();
        let id = manager.submit(TaskPriority::Normal, || Ok(21 * 2)).unwrap();

        let results = manager.try_recv_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].task_id, id);
        assert_eq!(*results[0].result.as_ref().unwrap(), 42);
        assert!(manager.is_idle());
    }

    #[test]
    fn test_worker_threads_deliver_results() {
        let manager = BackgroundTaskManager::new(TaskManagerConfig {
            num_threads: 2,
            ..Default::default()
        });
        for i in 0..8u32 {
            manager.submit(TaskPriority::Normal, move || Ok(i)).unwrap();
        }

        let mut values = Vec::new();
        while values.len() < 8 {
            let result = manager.recv_result_timeout(Duration::from_secs(5)).unwrap();
            values.push(result.result.unwrap());
        }
        values.sort();
        assert_eq!(values, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_task_reports_error() {
        let manager: BackgroundTaskManager<()> = BackgroundTaskManager::for_testing();
        manager.submit(TaskPriority::High, || panic!("boom")).unwrap();
        let results = manager.try_recv_results();
        assert!(matches!(&results[0].result, Err(Error::Task(msg)) if msg.contains("boom")));
    }

    #[test]
    fn test_evicted_task_reports_error() {
        let manager = BackgroundTaskManager::new(TaskManagerConfig {
            num_threads: 1,
            max_queue_size: 1,
            test_mode: false,
        });
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let blocker = manager
            .submit(TaskPriority::Critical, move || {
                let _ = release_rx.recv_timeout(Duration::from_secs(5));
                Ok(0u32)
            })
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.running_tasks() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }

        let low = manager.submit(TaskPriority::Low, || Ok(1)).unwrap();
        let high = manager.submit(TaskPriority::High, || Ok(2)).unwrap();

        let evicted = manager.recv_result_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(evicted.task_id, low);
        assert!(matches!(evicted.result, Err(Error::Task(_))));

        release_tx.send(()).unwrap();
        let mut finished: Vec<TaskId> = (0..2)
            .map(|_| manager.recv_result_timeout(Duration::from_secs(5)).unwrap().task_id)
            .collect();
        finished.sort();
        assert_eq!(finished, vec![blocker, high]);
    }

    #[test]
    fn test_submit_after_shutdown() {
        let manager: BackgroundTaskManager<u8> = BackgroundTaskManager::for_testing();
        manager.shutdown();
        assert!(manager.is_shutting_down());
        assert!(manager.submit(TaskPriority::Low, || Ok(1)).is_err());
    }
}
