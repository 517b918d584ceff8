//! Priority task scheduler with cooperative preemption

use crate::errors::{RagError, Result};
use crate::intent::{classify_or_fallback, IntentClassification, IntentClassifier};
use crate::scheduler::runner::TaskRunner;
use crate::scheduler::store::TaskStore;
use crate::scheduler::types::{
    CancelReason, PriorityTable, RagRequest, SchedulerConfig, SchedulerStats, TaskPriority,
    TaskResult, TaskStatus,
};
use futures_util::FutureExt;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Queue entry ordered by priority, then FIFO by submission sequence
#[derive(Debug)]
struct QueuedTask {
    id: String,
    priority: TaskPriority,
    sequence: u64,
    deadline: Instant,
    request: RagRequest,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            order => order,
        }
    }
}

/// Cancellation token plus the first reason it was cancelled for
#[derive(Debug, Default)]
struct CancelSignal {
    token: CancellationToken,
    reason: OnceLock<CancelReason>,
}

impl CancelSignal {
    /// Returns false when the task was already being cancelled
    fn cancel(&self, reason: CancelReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        self.token.cancel();
        first
    }

    fn is_cancelling(&self) -> bool {
        self.reason.get().is_some()
    }

    fn reason(&self) -> Option<CancelReason> {
        self.reason.get().copied()
    }
}

#[derive(Debug)]
struct RunningTask {
    priority: TaskPriority,
    started: u64,
    signal: Arc<CancelSignal>,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    preempted: AtomicU64,
    timed_out: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, AtomicOrdering::Relaxed);
    }
}

struct Shared {
    config: SchedulerConfig,
    priorities: PriorityTable,
    runner: Arc<dyn TaskRunner>,
    store: TaskStore,
    queue: Mutex<BinaryHeap<QueuedTask>>,
    running: Mutex<HashMap<String, RunningTask>>,
    wake: Notify,
    shutdown: CancellationToken,
    accepting: AtomicBool,
    sequence: AtomicU64,
    starts: AtomicU64,
    counters: Counters,
}

/// Bounded worker pool draining a priority queue of RAG tasks.
///
/// Higher [`TaskPriority`] runs first, FIFO among equals. A submission that
/// cannot get a free worker signals the lowest-priority running task (most
/// recently started among ties) to stop at its next step boundary.
pub struct TaskScheduler {
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskScheduler {
    /// Spawn workers and the housekeeping loop on the current runtime
    pub fn start(
        config: SchedulerConfig,
        priorities: PriorityTable,
        runner: Arc<dyn TaskRunner>,
    ) -> Self {
        let workers = config.workers.max(1);
        let shared = Arc::new(Shared {
            config,
            priorities,
            runner,
            store: TaskStore::new(),
            queue: Mutex::new(BinaryHeap::new()),
            running: Mutex::new(HashMap::new()),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
            accepting: AtomicBool::new(true),
            sequence: AtomicU64::new(0),
            starts: AtomicU64::new(0),
            counters: Counters::default(),
        });

        let mut handles = Vec::with_capacity(workers + 1);
        for worker in 0..workers {
            let shared = shared.clone();
            handles.push(tokio::spawn(async move { shared.worker_loop(worker).await }));
        }
        {
            let shared = shared.clone();
            handles.push(tokio::spawn(async move { shared.housekeeping_loop().await }));
        }

        tracing::info!(workers, "scheduler started");
        Self {
            shared,
            handles: Mutex::new(handles),
        }
    }

    /// Enqueue `request`; fails only after shutdown
    pub fn submit(&self, request: RagRequest, priority: TaskPriority) -> Result<String> {
        let shared = &self.shared;
        let id = Uuid::new_v4().to_string();
        {
            // `shutdown` flips `accepting` under this lock before draining
            let mut queue = lock(&shared.queue);
            if !shared.accepting.load(AtomicOrdering::SeqCst) {
                return Err(RagError::SchedulerShutdown);
            }

            shared.store.insert_queued(&id);
            queue.push(QueuedTask {
                id: id.clone(),
                priority,
                sequence: shared.sequence.fetch_add(1, AtomicOrdering::SeqCst),
                deadline: Instant::now() + shared.config.task_timeout(),
                request,
            });
        }
        Counters::bump(&shared.counters.submitted);
        tracing::debug!(task_id = %id, %priority, "task queued");

        shared.preempt_for(priority);
        shared.wake.notify_one();
        Ok(id)
    }

    /// Classify `question`, map its level through the priority table and submit
    pub async fn submit_question(
        &self,
        question: &str,
        classifier: Option<&dyn IntentClassifier>,
    ) -> Result<(String, IntentClassification)> {
        let classification = classify_or_fallback(classifier, question).await;
        let priority = self.shared.priorities.priority_for(classification.level);
        let id = self.submit(RagRequest::new(question, classification.level), priority)?;
        Ok((id, classification))
    }

    /// Non-blocking poll; unknown ids report `not_found`
    pub fn get_task_result(&self, id: &str) -> TaskResult {
        self.shared.store.get(id)
    }

    /// Wait for a terminal status, returning the last seen one after `max_wait`
    pub async fn wait_for_result(&self, id: &str, max_wait: Duration) -> TaskResult {
        self.shared.store.wait(id, max_wait).await
    }

    pub fn stats(&self) -> SchedulerStats {
        let counters = &self.shared.counters;
        let load = |c: &AtomicU64| c.load(AtomicOrdering::Relaxed);
        SchedulerStats {
            submitted: load(&counters.submitted),
            completed: load(&counters.completed),
            failed: load(&counters.failed),
            cancelled: load(&counters.cancelled),
            preempted: load(&counters.preempted),
            timed_out: load(&counters.timed_out),
            queued: lock(&self.shared.queue).len(),
            running: lock(&self.shared.running).len(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub fn priorities(&self) -> &PriorityTable {
        &self.shared.priorities
    }

    pub fn is_shut_down(&self) -> bool {
        !self.shared.accepting.load(AtomicOrdering::SeqCst)
    }

    /// Stop accepting work, cancel queued and running tasks, join workers.
    ///
    /// Running tasks finish their current step first. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        let shared = &self.shared;
        let drained: Vec<QueuedTask> = {
            let mut queue = lock(&shared.queue);
            if shared.accepting.swap(false, AtomicOrdering::SeqCst) {
                tracing::info!("scheduler shutting down");
            }
            queue.drain().collect()
        };
        shared.shutdown.cancel();

        for task in lock(&shared.running).values() {
            task.signal.cancel(CancelReason::Shutdown);
        }

        for task in drained {
            shared.finish_queued(&task.id, "scheduler shut down");
        }

        shared.wake.notify_waiters();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *lock(&self.handles));
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "scheduler task ended abnormally");
            }
        }
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shared.accepting.store(false, AtomicOrdering::SeqCst);
        self.shared.shutdown.cancel();
        for task in lock(&self.shared.running).values() {
            task.signal.cancel(CancelReason::Shutdown);
        }
    }
}

impl Shared {
    async fn worker_loop(self: Arc<Self>, worker: usize) {
        loop {
            let notified = self.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shutdown.is_cancelled() {
                break;
            }

            match self.next_task() {
                Some(task) => self.run_task(task).await,
                None => {
                    tokio::select! {
                        _ = notified => {}
                        _ = self.shutdown.cancelled() => break,
                    }
                }
            }
        }
        tracing::debug!(worker, "worker stopped");
    }

    /// Pop the highest-priority task whose deadline has not passed
    fn next_task(&self) -> Option<QueuedTask> {
        loop {
            let task = lock(&self.queue).pop()?;
            if Instant::now() < task.deadline {
                return Some(task);
            }
            self.expire_queued(&task);
        }
    }

    async fn run_task(&self, task: QueuedTask) {
        if let Err(e) = self.store.transition(&task.id, TaskStatus::Running, None, None) {
            tracing::warn!(task_id = %task.id, error = %e, "task could not start");
            return;
        }

        let signal = Arc::new(CancelSignal::default());
        lock(&self.running).insert(
            task.id.clone(),
            RunningTask {
                priority: task.priority,
                started: self.starts.fetch_add(1, AtomicOrdering::SeqCst),
                signal: signal.clone(),
            },
        );
        tracing::info!(task_id = %task.id, priority = %task.priority, "task running");

        // Popped before `shutdown` walked the running set
        if self.shutdown.is_cancelled() {
            signal.cancel(CancelReason::Shutdown);
        }

        let timer = {
            let signal = signal.clone();
            let remaining = task.deadline.saturating_duration_since(Instant::now());
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(remaining) => {
                        if signal.cancel(CancelReason::Timeout) {
                            tracing::warn!("running task reached its deadline");
                        }
                    }
                    _ = signal.token.cancelled() => {}
                }
            })
        };

        let outcome = AssertUnwindSafe(self.runner.run(&task.request, &signal.token))
            .catch_unwind()
            .await;

        timer.abort();
        lock(&self.running).remove(&task.id);

        let (status, data, message) = match outcome {
            Ok(Ok(data)) => (TaskStatus::Completed, Some(data), None),
            Ok(Err(e)) if e.is_cancellation() => {
                let message = match signal.reason() {
                    Some(CancelReason::Preempted) => {
                        "preempted by a higher-priority task".to_string()
                    }
                    Some(CancelReason::Timeout) => self.timeout_message(),
                    Some(CancelReason::Shutdown) => "scheduler shut down".to_string(),
                    None => e.to_string(),
                };
                (TaskStatus::Cancelled, None, Some(message))
            }
            Ok(Err(e)) => (TaskStatus::Failed, None, Some(e.to_string())),
            Err(panic) => (
                TaskStatus::Failed,
                None,
                Some(format!("task panicked: {}", panic_message(panic.as_ref()))),
            ),
        };

        match status {
            TaskStatus::Completed => Counters::bump(&self.counters.completed),
            TaskStatus::Failed => Counters::bump(&self.counters.failed),
            _ => {
                Counters::bump(&self.counters.cancelled);
                if signal.reason() == Some(CancelReason::Timeout) {
                    Counters::bump(&self.counters.timed_out);
                }
            }
        }

        tracing::info!(task_id = %task.id, %status, "task finished");
        if let Err(e) = self.store.transition(&task.id, status, data, message) {
            tracing::warn!(task_id = %task.id, error = %e, "task result not recorded");
        }
    }

    /// Signal a lower-priority running task when `priority` has no free worker
    fn preempt_for(&self, priority: TaskPriority) {
        let ahead = lock(&self.queue)
            .iter()
            .filter(|task| task.priority >= priority)
            .count();

        let running = lock(&self.running);
        let busy = running
            .values()
            .filter(|task| !task.signal.is_cancelling())
            .count();
        let free = self.config.workers.max(1).saturating_sub(busy);
        if ahead <= free {
            return;
        }

        let victim = running
            .iter()
            .filter(|(_, task)| task.priority < priority && !task.signal.is_cancelling())
            .min_by(|(_, a), (_, b)| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.started.cmp(&a.started))
            });

        if let Some((id, task)) = victim {
            if task.signal.cancel(CancelReason::Preempted) {
                Counters::bump(&self.counters.preempted);
                tracing::info!(
                    task_id = %id,
                    victim_priority = %task.priority,
                    incoming_priority = %priority,
                    "preempting running task"
                );
            }
        }
    }

    async fn housekeeping_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.housekeeping_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep_expired_queue();
                    let purged = self.store.purge_expired(self.config.result_retention());
                    if purged > 0 {
                        tracing::debug!(purged, "expired task results removed");
                    }
                }
                _ = self.shutdown.cancelled() => break,
            }
        }
    }

    fn sweep_expired_queue(&self) {
        let now = Instant::now();
        let expired: Vec<QueuedTask> = {
            let mut queue = lock(&self.queue);
            if queue.iter().all(|task| task.deadline > now) {
                return;
            }
            let (expired, live): (Vec<_>, Vec<_>) = std::mem::take(&mut *queue)
                .into_vec()
                .into_iter()
                .partition(|task| task.deadline <= now);
            *queue = BinaryHeap::from(live);
            expired
        };

        for task in &expired {
            self.expire_queued(task);
        }
    }

    fn expire_queued(&self, task: &QueuedTask) {
        Counters::bump(&self.counters.timed_out);
        tracing::warn!(task_id = %task.id, "queued task timed out");
        self.finish_queued(&task.id, &self.timeout_message());
    }

    fn finish_queued(&self, id: &str, message: &str) {
        Counters::bump(&self.counters.cancelled);
        if let Err(e) = self
            .store
            .transition(id, TaskStatus::Cancelled, None, Some(message.to_string()))
        {
            tracing::warn!(task_id = id, error = %e, "queued task not cancelled");
        }
    }

    fn timeout_message(&self) -> String {
        RagError::TaskTimeout {
            duration_ms: self.config.task_timeout_ms,
        }
        .to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
