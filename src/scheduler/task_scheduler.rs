// src/scheduler/task_scheduler.rs
//! Dependency-aware, retrying, bounded-concurrency task scheduler
//!
//! The scheduler knows nothing about worlds or emails. Callers register one
//! handler per task type, enqueue typed payloads with optional dependencies,
//! and await outcomes. Every task ends `Complete` or `Failed`, and every
//! waiter is resolved.
//!
//! # Execution model
//!
//! ```text
//! enqueue ──▶ [Blocked] ──deps complete──▶ [Pending] ──pump──▶ tokio::spawn(handler)
//!                                              ▲                      │
//!                                              └──── retryable ◀──────┤
//!                                                                     ▼
//!                                                          finish ──▶ waiters
//! ```
//!
//! `pump` selects the highest-priority pending task (FIFO among equals) until
//! `concurrency` handlers are in flight. Handlers run on the tokio runtime, so a
//! handler suspended on I/O never holds up other tasks.

use crate::scheduler::graph::DependencyGraph;
use crate::scheduler::stats::{LatencyTracker, SchedulerStats};
use crate::scheduler::task::{
    TaskContext, TaskError, TaskFailure, TaskId, TaskOptions, TaskOutcome, TaskOutput,
    TaskPayload, TaskStatus,
};
use crate::utils::config::SchedulerConfig;
use crate::utils::errors::{EngineError, Result};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};

/// Boxed handler future
pub type HandlerFuture = BoxFuture<'static, std::result::Result<TaskOutput, TaskFailure>>;

/// Type-erased task handler
pub type TaskHandler = Arc<dyn Fn(TaskContext) -> HandlerFuture + Send + Sync>;

/// Longest delay a retry backoff can grow to
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

struct TaskEntry {
    task_type: String,
    payload: TaskPayload,
    priority: u32,
    max_retries: u32,
    status: TaskStatus,
    attempts: u32,
    seq: u64,
    enqueued_at: Instant,
    ready_at: Option<Instant>,
    last_error: Option<String>,
    outcome: watch::Sender<Option<TaskOutcome>>,
    abort: Option<AbortHandle>,
}

#[derive(Default)]
struct SchedulerState {
    tasks: HashMap<TaskId, TaskEntry>,
    graph: DependencyGraph,
    running: usize,
    next_seq: u64,
    completed: u64,
    failed: u64,
    retried: u64,
    latency: LatencyTracker,
}

impl SchedulerState {
    /// Highest priority pending task whose backoff has elapsed
    fn next_ready(&self, now: Instant) -> Option<TaskId> {
        self.tasks
            .iter()
            .filter(|(_, e)| {
                e.status == TaskStatus::Pending && e.ready_at.map_or(true, |at| at <= now)
            })
            .max_by(|(_, a), (_, b)| a.priority.cmp(&b.priority).then(b.seq.cmp(&a.seq)))
            .map(|(id, _)| id.clone())
    }

    fn dependency_outputs(&self, id: &TaskId) -> HashMap<TaskId, TaskOutput> {
        self.graph
            .declared(id)
            .iter()
            .filter_map(|dep| {
                let entry = self.tasks.get(dep)?;
                let outcome = entry.outcome.borrow();
                match &*outcome {
                    Some(Ok(output)) => Some((dep.clone(), output.clone())),
                    _ => None,
                }
            })
            .collect()
    }

    /// Fail a task, resolve its waiters and cascade to every dependent
    fn resolve_failed(&mut self, id: &TaskId, error: TaskError) {
        let mut queue = VecDeque::from([(id.clone(), error)]);

        while let Some((task, error)) = queue.pop_front() {
            let Some(entry) = self.tasks.get_mut(&task) else {
                continue;
            };
            if entry.status.is_terminal() {
                continue;
            }

            if entry.status == TaskStatus::Running {
                if let Some(handle) = entry.abort.take() {
                    handle.abort();
                }
                self.running = self.running.saturating_sub(1);
            }

            debug!("Task {} failed ({}): {}", task, error.reason(), error);
            entry.status = TaskStatus::Failed;
            entry.ready_at = None;
            entry.last_error = Some(error.to_string());
            let reason = error.reason();
            entry.outcome.send_replace(Some(Err(error)));

            self.failed += 1;
            metrics::counter!("worldsim_tasks_failed_total", "reason" => reason).increment(1);

            for dependent in self.graph.dependents(&task) {
                queue.push_back((
                    dependent.clone(),
                    TaskError::DependencyFailed {
                        dependency: task.clone(),
                    },
                ));
            }
        }
    }
}

struct Shared {
    config: SchedulerConfig,
    handlers: RwLock<HashMap<String, TaskHandler>>,
    state: Mutex<SchedulerState>,
}

/// Task scheduler handle (cheap to clone)
#[derive(Clone)]
pub struct TaskScheduler {
    shared: Arc<Shared>,
}

impl TaskScheduler {
    /// Create a new scheduler
    pub fn new(config: SchedulerConfig) -> Self {
        info!(
            "Task scheduler initialized (concurrency {}, default attempts {})",
            config.concurrency, config.default_max_retries
        );

        Self {
            shared: Arc::new(Shared {
                config,
                handlers: RwLock::new(HashMap::new()),
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    /// Scheduler with no retry backoff
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self::new(SchedulerConfig::immediate(concurrency))
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Register the handler for a task type (one per type)
    pub fn register_handler<F, Fut>(&self, task_type: impl Into<String>, handler: F) -> Result<()>
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<TaskOutput, TaskFailure>> + Send + 'static,
    {
        let task_type = task_type.into();
        let mut handlers = self.shared.handlers.write();

        if handlers.contains_key(&task_type) {
            return Err(EngineError::HandlerAlreadyRegistered(task_type));
        }

        let handler: TaskHandler = Arc::new(move |ctx| handler(ctx).boxed());
        debug!("Registered handler for task type '{}'", task_type);
        handlers.insert(task_type, handler);

        Ok(())
    }

    pub fn has_handler(&self, task_type: &str) -> bool {
        self.shared.handlers.read().contains_key(task_type)
    }

    /// Enqueue a task
    ///
    /// Fails immediately when the type has no handler or a dependency id is
    /// unknown. A task whose dependency already failed is created `Failed`.
    pub fn enqueue(
        &self,
        task_type: &str,
        payload: TaskPayload,
        options: TaskOptions,
    ) -> Result<TaskId> {
        if !self.has_handler(task_type) {
            return Err(EngineError::UnregisteredTaskType(task_type.to_string()));
        }

        let id = TaskId::new();
        let max_retries = options
            .max_retries
            .unwrap_or(self.shared.config.default_max_retries)
            .max(1);

        {
            let mut state = self.shared.state.lock();

            let mut declared: Vec<TaskId> = Vec::with_capacity(options.dependencies.len());
            for dep in options.dependencies {
                if !state.tasks.contains_key(&dep) {
                    return Err(EngineError::UnknownTask(dep.to_string()));
                }
                if !declared.contains(&dep) {
                    declared.push(dep);
                }
            }

            let failed_dependency = declared
                .iter()
                .find(|dep| state.tasks[*dep].status == TaskStatus::Failed)
                .cloned();
            let outstanding: HashSet<TaskId> = declared
                .iter()
                .filter(|dep| state.tasks[*dep].status != TaskStatus::Complete)
                .cloned()
                .collect();

            let status = if outstanding.is_empty() {
                TaskStatus::Pending
            } else {
                TaskStatus::Blocked
            };

            let seq = state.next_seq;
            state.next_seq += 1;

            let (outcome, _) = watch::channel(None);
            state.tasks.insert(
                id.clone(),
                TaskEntry {
                    task_type: task_type.to_string(),
                    payload,
                    priority: options.priority,
                    max_retries,
                    status,
                    attempts: 0,
                    seq,
                    enqueued_at: Instant::now(),
                    ready_at: None,
                    last_error: None,
                    outcome,
                    abort: None,
                },
            );
            state.graph.insert(id.clone(), declared, outstanding);

            if let Some(dependency) = failed_dependency {
                state.resolve_failed(&id, TaskError::DependencyFailed { dependency });
            }

            trace!("Enqueued {} task {} ({:?})", task_type, id, status);
        }

        metrics::counter!("worldsim_tasks_enqueued_total", "task_type" => task_type.to_string())
            .increment(1);

        self.pump();
        Ok(id)
    }

    /// Wait for a task to settle; any number of callers may wait on one id
    pub async fn await_result(&self, id: &TaskId) -> TaskOutcome {
        let mut rx = {
            let state = self.shared.state.lock();
            match state.tasks.get(id) {
                Some(entry) => entry.outcome.subscribe(),
                None => return Err(TaskError::Unknown(id.clone())),
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome)
                .clone()
                .unwrap_or_else(|| Err(TaskError::Unknown(id.clone()))),
            Err(_) => Err(TaskError::Unknown(id.clone())),
        };
        outcome
    }

    /// Wait for several tasks, outcomes in input order
    pub async fn await_all(&self, ids: &[TaskId]) -> Vec<TaskOutcome> {
        futures::future::join_all(ids.iter().map(|id| self.await_result(id))).await
    }

    /// Outcome if the task already settled
    pub fn try_result(&self, id: &TaskId) -> Option<TaskOutcome> {
        let state = self.shared.state.lock();
        let entry = state.tasks.get(id)?;
        let outcome = (*entry.outcome.borrow()).clone();
        outcome
    }

    pub fn status(&self, id: &TaskId) -> Option<TaskStatus> {
        self.shared.state.lock().tasks.get(id).map(|e| e.status)
    }

    /// Handler invocations so far
    pub fn attempts(&self, id: &TaskId) -> Option<u32> {
        self.shared.state.lock().tasks.get(id).map(|e| e.attempts)
    }

    /// Most recent handler error, if any
    pub fn last_error(&self, id: &TaskId) -> Option<String> {
        self.shared
            .state
            .lock()
            .tasks
            .get(id)
            .and_then(|e| e.last_error.clone())
    }

    /// Cancel a task
    ///
    /// Blocked or pending tasks go straight to `Failed` ("cancelled"); a running
    /// handler is aborted. Dependents fail with "dependency failed". Returns
    /// `false` when the task had already settled.
    pub fn cancel(&self, id: &TaskId) -> Result<bool> {
        let cancelled = {
            let mut state = self.shared.state.lock();
            let status = state
                .tasks
                .get(id)
                .map(|e| e.status)
                .ok_or_else(|| EngineError::UnknownTask(id.to_string()))?;

            if status.is_terminal() {
                false
            } else {
                state.resolve_failed(id, TaskError::Cancelled);
                true
            }
        };

        if cancelled {
            debug!("Cancelled task {}", id);
            self.pump();
        }

        Ok(cancelled)
    }

    /// Cancel every unsettled task in `ids` at once
    ///
    /// Unlike calling `cancel` in a loop, nothing in `ids` can be dispatched
    /// between two cancellations. Unknown ids are skipped. Returns how many
    /// tasks were cancelled.
    pub fn cancel_many(&self, ids: &[TaskId]) -> usize {
        let cancelled = {
            let mut state = self.shared.state.lock();
            let mut cancelled = 0;
            for id in ids {
                let unsettled = state.tasks.get(id).is_some_and(|e| !e.status.is_terminal());
                if unsettled {
                    state.resolve_failed(id, TaskError::Cancelled);
                    cancelled += 1;
                }
            }
            cancelled
        };

        if cancelled > 0 {
            debug!("Cancelled {} tasks", cancelled);
            self.pump();
        }
        cancelled
    }

    /// Forget settled tasks so long-running schedulers do not grow unbounded
    ///
    /// A task is kept while any of its dependents is unsettled, since the
    /// dependent still needs its output. Returns the number removed.
    pub fn purge_settled(&self, ids: &[TaskId]) -> usize {
        let mut state = self.shared.state.lock();
        let state = &mut *state;
        let mut removed = 0;

        for id in ids {
            let Some(entry) = state.tasks.get(id) else {
                continue;
            };
            if !entry.status.is_terminal() {
                continue;
            }
            let dependents_settled = state.graph.dependents(id).iter().all(|dep| {
                state
                    .tasks
                    .get(dep)
                    .map_or(true, |d| d.status.is_terminal())
            });
            if !dependents_settled {
                continue;
            }

            state.tasks.remove(id);
            state.graph.remove(id);
            removed += 1;
        }

        removed
    }

    /// Live scheduler counters
    pub fn stats(&self) -> SchedulerStats {
        let state = self.shared.state.lock();
        let mut stats = SchedulerStats {
            completed: state.completed,
            failed: state.failed,
            retried: state.retried,
            avg_latency_ms: state.latency.mean_ms(),
            concurrency: self.shared.config.concurrency,
            ..Default::default()
        };

        for entry in state.tasks.values() {
            match entry.status {
                TaskStatus::Blocked => stats.blocked += 1,
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Complete | TaskStatus::Failed => {}
            }
        }

        stats
    }

    /// Dispatch pending tasks up to the concurrency bound
    fn pump(&self) {
        let mut launches = Vec::new();

        {
            let mut state = self.shared.state.lock();
            let now = Instant::now();

            while state.running < self.shared.config.concurrency {
                let Some(id) = state.next_ready(now) else {
                    break;
                };

                let handler = {
                    let handlers = self.shared.handlers.read();
                    handlers.get(&state.tasks[&id].task_type).cloned()
                };
                let Some(handler) = handler else {
                    state.resolve_failed(&id, TaskError::Fatal("no handler registered".into()));
                    continue;
                };

                let dependency_outputs = state.dependency_outputs(&id);
                let Some(entry) = state.tasks.get_mut(&id) else {
                    break;
                };
                entry.status = TaskStatus::Running;
                entry.attempts += 1;
                entry.ready_at = None;

                let ctx = TaskContext {
                    task_id: id.clone(),
                    task_type: entry.task_type.clone(),
                    payload: entry.payload.clone(),
                    attempt: entry.attempts,
                    dependency_outputs,
                };
                let attempt = entry.attempts;
                state.running += 1;

                trace!("Dispatching task {} (attempt {})", id, attempt);
                launches.push((id, attempt, handler, ctx));
            }

            metrics::gauge!("worldsim_tasks_running").set(state.running as f64);
        }

        for (id, attempt, handler, ctx) in launches {
            let scheduler = self.clone();
            let task_id = id.clone();

            let handle = tokio::spawn(async move {
                let result = AssertUnwindSafe(async move { handler(ctx).await })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(TaskFailure::Fatal("handler panicked".to_string())));
                scheduler.finish(&task_id, result);
            });

            let mut state = self.shared.state.lock();
            match state.tasks.get_mut(&id) {
                Some(entry) if entry.status == TaskStatus::Running && entry.attempts == attempt => {
                    entry.abort = Some(handle.abort_handle());
                }
                // settled (cancelled or purged) before the handle was stored
                _ => handle.abort(),
            }
        }
    }

    /// Apply a handler result
    fn finish(&self, id: &TaskId, result: std::result::Result<TaskOutput, TaskFailure>) {
        let mut retry_after = None;

        {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;

            let Some(entry) = state.tasks.get_mut(id) else {
                return;
            };
            if entry.status != TaskStatus::Running {
                // cancelled while the handler was finishing
                trace!("Ignoring late result for task {}", id);
                return;
            }
            entry.abort = None;

            match result {
                Ok(output) => {
                    let latency = entry.enqueued_at.elapsed();
                    entry.status = TaskStatus::Complete;
                    entry.outcome.send_replace(Some(Ok(output)));

                    state.running = state.running.saturating_sub(1);
                    state.completed += 1;
                    state.latency.record(latency);
                    metrics::counter!("worldsim_tasks_completed_total").increment(1);
                    metrics::histogram!("worldsim_task_latency_seconds")
                        .record(latency.as_secs_f64());

                    for ready in state.graph.complete(id) {
                        if let Some(dependent) = state.tasks.get_mut(&ready) {
                            if dependent.status == TaskStatus::Blocked {
                                trace!("Task {} unblocked by {}", ready, id);
                                dependent.status = TaskStatus::Pending;
                            }
                        }
                    }
                }
                Err(TaskFailure::Retryable(msg)) if entry.attempts < entry.max_retries => {
                    let delay = retry_backoff(self.shared.config.retry_backoff(), entry.attempts);
                    warn!(
                        "Task {} attempt {}/{} failed, retrying: {}",
                        id, entry.attempts, entry.max_retries, msg
                    );

                    entry.status = TaskStatus::Pending;
                    entry.last_error = Some(msg);
                    if !delay.is_zero() {
                        entry.ready_at = Some(Instant::now() + delay);
                        retry_after = Some(delay);
                    }

                    state.running = state.running.saturating_sub(1);
                    state.retried += 1;
                    metrics::counter!("worldsim_tasks_retried_total").increment(1);
                }
                Err(TaskFailure::Retryable(msg)) => {
                    let error = TaskError::RetriesExhausted {
                        attempts: entry.attempts,
                        last_error: msg,
                    };
                    state.resolve_failed(id, error);
                }
                Err(TaskFailure::Fatal(msg)) => {
                    state.resolve_failed(id, TaskError::Fatal(msg));
                }
            }
        }

        if let Some(delay) = retry_after {
            let scheduler = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                scheduler.pump();
            });
        }

        self.pump();
    }
}

/// Exponential backoff: base, 2x base, 4x base, ... capped
fn retry_backoff(base: Duration, attempts: u32) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    let factor = 1u32 << attempts.saturating_sub(1).min(10);
    base.saturating_mul(factor).min(MAX_RETRY_BACKOFF)
}
