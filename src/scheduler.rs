//! Priority task scheduler backed by a fixed worker pool.
//!
//! Work that must not run on a real-time loop (voice command execution,
//! frame post-processing) is queued here. Lower priority values run
//! first, equal priorities run in submission order. A full queue sheds
//! the new task instead of blocking the caller.
//!
//! Uncollected results are bounded both by count and by age so a caller
//! that never polls cannot grow the result map without limit.

use crate::config::SchedulerConfig;
use crate::{Error, Result};
use log::{debug, error, info, warn};
use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Identifier handed back by [`TaskScheduler::schedule`]
pub type TaskId = String;

type BoxedResult = Box<dyn Any + Send>;
type TaskFn = Box<dyn FnOnce() -> Option<BoxedResult> + Send>;

struct QueuedTask {
    priority: i32,
    sequence: u64,
    id: TaskId,
    run: TaskFn,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    // BinaryHeap is a max-heap: the smallest (priority, sequence) must compare greatest
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct StoredResult {
    value: BoxedResult,
    stored_at: Instant,
}

struct Shared {
    queue: Mutex<BinaryHeap<QueuedTask>>,
    available: Condvar,
    results: Mutex<HashMap<TaskId, StoredResult>>,
    running: AtomicBool,
    next_sequence: AtomicU64,
    config: SchedulerConfig,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, BinaryHeap<QueuedTask>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn results(&self) -> MutexGuard<'_, HashMap<TaskId, StoredResult>> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_result(&self, id: TaskId, value: BoxedResult) {
        let now = Instant::now();
        let ttl = Duration::from_millis(self.config.result_ttl_ms);
        let mut results = self.results();

        results.retain(|_, stored| now.duration_since(stored.stored_at) < ttl);
        while results.len() >= self.config.result_capacity.max(1) {
            let oldest = results
                .iter()
                .min_by_key(|(_, stored)| stored.stored_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    debug!("Evicting uncollected result {}", key);
                    results.remove(&key);
                }
                None => break,
            }
        }

        results.insert(id, StoredResult { value, stored_at: now });
    }
}

/// Fixed-size worker pool fed by a priority queue
pub struct TaskScheduler {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskScheduler {
    /// Create a scheduler; workers start with [`TaskScheduler::start`]
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(BinaryHeap::new()),
                available: Condvar::new(),
                results: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
                next_sequence: AtomicU64::new(0),
                config,
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker threads
    pub fn start(&self) -> Result<()> {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        let count = self.shared.config.workers.max(1);
        info!("Starting task scheduler with {} workers", count);
        for index in 0..count {
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name(format!("scheduler-{index}"))
                .spawn(move || worker_loop(&shared))
                .map_err(|e| Error::SchedulerError(format!("Failed to spawn worker {index}: {e}")))?;
            workers.push(handle);
        }
        Ok(())
    }

    /// Stop the workers. Queued tasks that have not started are dropped.
    pub fn stop(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        if !self.shared.running.swap(false, Ordering::AcqRel) && handles.is_empty() {
            return;
        }
        self.shared.available.notify_all();

        let deadline = Instant::now() + Duration::from_millis(self.shared.config.task_timeout_ms.max(1));
        for handle in handles {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    error!("Scheduler worker terminated abnormally");
                }
            } else {
                warn!("Scheduler worker still busy at shutdown, detaching");
            }
        }

        let dropped = {
            let mut queue = self.shared.queue();
            let n = queue.len();
            queue.clear();
            n
        };
        if dropped > 0 {
            info!("Dropped {} queued tasks at shutdown", dropped);
        }
    }

    /// Whether workers are running
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Queue a task whose result is not collected.
    ///
    /// Returns the task id. When the queue is at capacity the task is
    /// logged and dropped; the id is still returned.
    pub fn schedule<F>(&self, priority: i32, id: Option<&str>, task: F) -> TaskId
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(
            priority,
            id,
            Box::new(move || {
                task();
                None
            }),
        )
    }

    /// Queue a task and keep its return value for [`TaskScheduler::get_result`]
    pub fn schedule_with_result<F, R>(&self, priority: i32, id: Option<&str>, task: F) -> TaskId
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.enqueue(priority, id, Box::new(move || Some(Box::new(task()) as BoxedResult)))
    }

    fn enqueue(&self, priority: i32, id: Option<&str>, run: TaskFn) -> TaskId {
        let sequence = self.shared.next_sequence.fetch_add(1, Ordering::Relaxed);
        let id = id.map_or_else(|| format!("task-{sequence}"), str::to_string);

        {
            let mut queue = self.shared.queue();
            if queue.len() >= self.shared.config.queue_capacity {
                warn!("Task queue full, dropping task {}", id);
                return id;
            }
            queue.push(QueuedTask {
                priority,
                sequence,
                id: id.clone(),
                run,
            });
        }
        self.shared.available.notify_one();
        debug!("Scheduled task {} at priority {}", id, priority);
        id
    }

    /// Non-blocking poll for a task result.
    ///
    /// With `clear` the result is removed; otherwise a clone is returned
    /// and the stored value stays until collected or expired.
    pub fn get_result<R: Clone + Send + 'static>(&self, id: &str, clear: bool) -> Option<R> {
        if clear {
            self.take_result(id)
        } else {
            let ttl = Duration::from_millis(self.shared.config.result_ttl_ms);
            let results = self.shared.results();
            results
                .get(id)
                .filter(|stored| stored.stored_at.elapsed() < ttl)
                .and_then(|stored| stored.value.downcast_ref::<R>().cloned())
        }
    }

    /// Remove and return a task result.
    ///
    /// A result requested with the wrong type stays stored.
    pub fn take_result<R: Send + 'static>(&self, id: &str) -> Option<R> {
        let ttl = Duration::from_millis(self.shared.config.result_ttl_ms);
        let mut results = self.shared.results();
        let stored = results.get(id)?;
        if stored.stored_at.elapsed() >= ttl {
            results.remove(id);
            return None;
        }
        if !stored.value.is::<R>() {
            warn!("Result of task {} requested with the wrong type", id);
            return None;
        }
        results
            .remove(id)
            .and_then(|stored| stored.value.downcast::<R>().ok())
            .map(|value| *value)
    }

    /// Drop every stored result
    pub fn clear_results(&self) {
        self.shared.results().clear();
    }

    /// Number of queued tasks not yet picked up by a worker
    pub fn pending_tasks(&self) -> usize {
        self.shared.queue().len()
    }

    /// Whether any uncollected result is stored
    pub fn has_results(&self) -> bool {
        !self.shared.results().is_empty()
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: &Shared) {
    let timeout = Duration::from_millis(shared.config.task_timeout_ms);

    while let Some(task) = next_task(shared) {
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(task.run));
        let elapsed = started.elapsed();

        match outcome {
            Ok(result) if elapsed > timeout => {
                warn!(
                    "Task {} exceeded its {:?} budget ({:?}), discarding result",
                    task.id, timeout, elapsed
                );
                drop(result);
            }
            Ok(Some(value)) => shared.store_result(task.id, value),
            Ok(None) => debug!("Task {} completed in {:?}", task.id, elapsed),
            Err(_) => error!("Task {} panicked", task.id),
        }
    }
}

fn next_task(shared: &Shared) -> Option<QueuedTask> {
    let mut queue = shared.queue();
    loop {
        if !shared.running.load(Ordering::Acquire) {
            return None;
        }
        if let Some(task) = queue.pop() {
            return Some(task);
        }
        queue = shared
            .available
            .wait_timeout(queue, Duration::from_millis(100))
            .unwrap_or_else(PoisonError::into_inner)
            .0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(workers: usize, queue_capacity: usize) -> SchedulerConfig {
        SchedulerConfig {
            workers,
            queue_capacity,
            ..SchedulerConfig::default()
        }
    }

    #[test]
    fn test_queue_ordering() {
        let mut heap = BinaryHeap::new();
        for (priority, sequence) in [(2, 0), (2, 1), (0, 2), (1, 3), (0, 4)] {
            heap.push(QueuedTask {
                priority,
                sequence,
                id: format!("{priority}-{sequence}"),
                run: Box::new(|| None),
            });
        }
        let order: Vec<String> = std::iter::from_fn(|| heap.pop()).map(|t| t.id).collect();
        assert_eq!(order, vec!["0-2", "0-4", "1-3", "2-0", "2-1"]);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let scheduler = TaskScheduler::new(config(1, 8));
        let a = scheduler.schedule(1, None, || {});
        let b = scheduler.schedule(1, None, || {});
        assert_ne!(a, b);
        assert_eq!(scheduler.pending_tasks(), 2);
    }

    #[test]
    fn test_full_queue_sheds() {
        let scheduler = TaskScheduler::new(config(1, 2));
        scheduler.schedule(1, Some("a"), || {});
        scheduler.schedule(1, Some("b"), || {});
        let id = scheduler.schedule(1, Some("c"), || {});
        assert_eq!(id, "c");
        assert_eq!(scheduler.pending_tasks(), 2);
    }

    #[test]
    fn test_result_capacity_evicts_oldest() {
        let scheduler = TaskScheduler::new(SchedulerConfig {
            result_capacity: 2,
            ..SchedulerConfig::default()
        });
        scheduler.shared.store_result("one".to_string(), Box::new(1u32));
        thread::sleep(Duration::from_millis(2));
        scheduler.shared.store_result("two".to_string(), Box::new(2u32));
        thread::sleep(Duration::from_millis(2));
        scheduler.shared.store_result("three".to_string(), Box::new(3u32));

        assert_eq!(scheduler.take_result::<u32>("one"), None);
        assert_eq!(scheduler.get_result::<u32>("two", false), Some(2));
        assert_eq!(scheduler.get_result::<u32>("three", true), Some(3));
        assert_eq!(scheduler.get_result::<u32>("three", true), None);
    }

    #[test]
    fn test_expired_results_are_hidden() {
        let scheduler = TaskScheduler::new(SchedulerConfig {
            result_ttl_ms: 10,
            ..SchedulerConfig::default()
        });
        scheduler.shared.store_result("old".to_string(), Box::new("value"));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(scheduler.get_result::<&str>("old", false), None);
        assert_eq!(scheduler.take_result::<&str>("old"), None);
    }

    #[test]
    fn test_wrong_type_returns_none() {
        let scheduler = TaskScheduler::new(SchedulerConfig::default());
        scheduler.shared.store_result("x".to_string(), Box::new(7i64));
        assert_eq!(scheduler.take_result::<String>("x"), None);
    }
}
