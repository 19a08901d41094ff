//! # Eventide-Scheduler
//!
//! Nanosecond-precision real-time task scheduler.
//!
//! ## Features
//! - Deadline- and priority-driven dispatch (EDF, LLF, RM, fixed priority)
//! - FIFO tie-breaking preserved under concurrent producers
//! - Panic-isolating task execution with latency statistics
//! - Cancellation of pending tasks by id

mod queue;

use std::collections::{BinaryHeap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use queue::QueueEntry;

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("task queue full")]
    QueueFull,

    #[error("task callback failed: {0}")]
    TaskFailed(String),
}

/// Priority levels. `Ord` follows the discriminants, so `Critical` ranks
/// above `Background`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Critical = 100,
    High = 75,
    Medium = 50,
    Low = 25,
    Background = 10,
}

impl Priority {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}

/// Scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulingPolicy {
    /// Earliest deadline first
    EarliestDeadlineFirst,
    /// Least laxity first
    LeastLaxityFirst,
    /// Rate monotonic (static priority from declared periods)
    RateMonotonic,
    /// Fixed priority
    FixedPriority,
}

/// An absolute point on the monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    pub at: Instant,
}

impl Deadline {
    pub fn from_now(duration: Duration) -> Self {
        Self {
            at: Instant::now() + duration,
        }
    }

    pub fn from_nanos(nanos: u64) -> Self {
        Self::from_now(Duration::from_nanos(nanos))
    }

    pub fn from_micros(micros: u64) -> Self {
        Self::from_now(Duration::from_micros(micros))
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::from_now(Duration::from_millis(millis))
    }

    /// Time remaining, `None` once passed.
    pub fn time_until(&self) -> Option<Duration> {
        self.at.checked_duration_since(Instant::now())
    }

    pub fn is_passed(&self) -> bool {
        Instant::now() >= self.at
    }
}

/// A schedulable unit of work.
#[derive(Debug)]
pub struct ScheduledTask<T> {
    pub id: u64,
    pub payload: T,
    pub priority: Priority,
    pub deadline: Deadline,
    pub created_at: Instant,
    pub estimated_runtime: Duration,
    pub period: Option<Duration>,
}

impl<T> ScheduledTask<T> {
    /// Slack in nanoseconds: deadline minus now minus the runtime
    /// estimate. Negative once the task is overdue.
    pub fn laxity_ns(&self) -> i128 {
        let now = Instant::now();
        let until = match self.deadline.at.checked_duration_since(now) {
            Some(remaining) => remaining.as_nanos() as i128,
            None => -(now.duration_since(self.deadline.at).as_nanos() as i128),
        };
        until - self.estimated_runtime.as_nanos() as i128
    }
}

/// Outcome of one `execute_task` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    MissedDeadline,
    Failed,
}

/// Scheduler statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub scheduled_tasks: u64,
    pub completed_tasks: u64,
    pub missed_deadlines: u64,
    pub failed_tasks: u64,
    pub average_latency_ns: u64,
    pub queue_size: usize,
    pub peak_queue_size: usize,
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub policy: SchedulingPolicy,
    pub max_queue_size: usize,
    pub enable_rt_scheduling: bool,
    pub cpu_affinity: Option<Vec<usize>>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: SchedulingPolicy::EarliestDeadlineFirst,
            max_queue_size: 10_000,
            enable_rt_scheduling: false,
            cpu_affinity: None,
        }
    }
}

struct QueueState<T> {
    heap: BinaryHeap<QueueEntry<T>>,
    next_id: u64,
    pending: HashSet<u64>,
    cancelled: HashSet<u64>,
}

/// Real-time scheduler over a single policy-ordered queue.
///
/// Producers may `schedule` concurrently with one consumer draining via
/// `next_task`; ids are assigned under the queue lock so FIFO
/// tie-breaking survives concurrent insertion.
pub struct RealtimeScheduler<T> {
    queue: RwLock<QueueState<T>>,
    stats: RwLock<SchedulerStats>,
    running: AtomicBool,
    config: SchedulerConfig,
}

impl<T> RealtimeScheduler<T> {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            queue: RwLock::new(QueueState {
                heap: BinaryHeap::new(),
                next_id: 0,
                pending: HashSet::new(),
                cancelled: HashSet::new(),
            }),
            stats: RwLock::new(SchedulerStats::default()),
            running: AtomicBool::new(false),
            config,
        }
    }

    /// Schedule a task; fails closed when the queue is at capacity.
    pub fn schedule(
        &self,
        payload: T,
        deadline: Deadline,
        priority: Priority,
    ) -> Result<u64, ScheduleError> {
        self.enqueue(payload, deadline, priority, Duration::ZERO, None)
    }

    /// Schedule with a worst-case runtime estimate for laxity ranking.
    pub fn schedule_with_runtime(
        &self,
        payload: T,
        deadline: Deadline,
        priority: Priority,
        estimated_runtime: Duration,
    ) -> Result<u64, ScheduleError> {
        self.enqueue(payload, deadline, priority, estimated_runtime, None)
    }

    /// Register a periodic task; its static priority derives from the
    /// declared period (shorter period, higher priority) and its first
    /// deadline is one period out.
    pub fn schedule_periodic(&self, payload: T, period: Duration) -> Result<u64, ScheduleError> {
        let priority = rate_priority(period);
        self.enqueue(payload, Deadline::from_now(period), priority, Duration::ZERO, Some(period))
    }

    fn enqueue(
        &self,
        payload: T,
        deadline: Deadline,
        priority: Priority,
        estimated_runtime: Duration,
        period: Option<Duration>,
    ) -> Result<u64, ScheduleError> {
        let mut queue = self.queue.write();
        if queue.heap.len() >= self.config.max_queue_size {
            return Err(ScheduleError::QueueFull);
        }

        queue.next_id += 1;
        let id = queue.next_id;
        queue.pending.insert(id);
        queue.heap.push(QueueEntry {
            task: ScheduledTask {
                id,
                payload,
                priority,
                deadline,
                created_at: Instant::now(),
                estimated_runtime,
                period,
            },
            policy: self.config.policy,
        });
        let depth = queue.heap.len();
        drop(queue);

        let mut stats = self.stats.write();
        stats.scheduled_tasks += 1;
        stats.queue_size = depth;
        stats.peak_queue_size = stats.peak_queue_size.max(depth);
        Ok(id)
    }

    /// Non-blocking dequeue of the highest-ranked task.
    pub fn next_task(&self) -> Option<ScheduledTask<T>> {
        let mut queue = self.queue.write();
        let mut popped = None;
        while let Some(entry) = queue.heap.pop() {
            let id = entry.task.id;
            queue.pending.remove(&id);
            if queue.cancelled.remove(&id) {
                debug!(task_id = id, "dropping cancelled task at dequeue");
                continue;
            }
            popped = Some(entry.task);
            break;
        }
        let depth = queue.heap.len();
        drop(queue);

        self.stats.write().queue_size = depth;
        popped
    }

    /// Cancel a pending task. Returns `false` once the task has already
    /// been dequeued (or never existed); the entry itself is discarded
    /// lazily at dequeue.
    pub fn cancel(&self, id: u64) -> bool {
        let mut queue = self.queue.write();
        if queue.pending.remove(&id) {
            queue.cancelled.insert(id);
            true
        } else {
            false
        }
    }

    /// Run `f` over the task payload, isolating panics and folding the
    /// outcome into the statistics. Latency is measured from creation to
    /// execution entry.
    pub fn execute_task<F>(&self, task: ScheduledTask<T>, f: F) -> TaskOutcome
    where
        F: FnOnce(T),
    {
        let ScheduledTask {
            id,
            payload,
            deadline,
            created_at,
            ..
        } = task;

        let entered = Instant::now();
        let missed = entered >= deadline.at;
        let latency_ns = entered.duration_since(created_at).as_nanos() as u64;

        let outcome = match catch_unwind(AssertUnwindSafe(move || f(payload))) {
            Err(_) => {
                warn!(task_id = id, "task callback panicked; counting as failed");
                TaskOutcome::Failed
            }
            Ok(()) if missed => {
                debug!(task_id = id, "task entered execution past its deadline");
                TaskOutcome::MissedDeadline
            }
            Ok(()) => TaskOutcome::Completed,
        };

        let mut stats = self.stats.write();
        match outcome {
            TaskOutcome::Completed => stats.completed_tasks += 1,
            TaskOutcome::MissedDeadline => stats.missed_deadlines += 1,
            TaskOutcome::Failed => stats.failed_tasks += 1,
        }
        if outcome != TaskOutcome::Failed {
            let executed = stats.completed_tasks + stats.missed_deadlines;
            let total = stats.average_latency_ns.saturating_mul(executed - 1);
            stats.average_latency_ns = (total + latency_ns) / executed;
        }
        outcome
    }

    pub fn start(&self) {
        self.running.store(true, AtomicOrdering::SeqCst);
    }

    pub fn stop(&self) {
        self.running.store(false, AtomicOrdering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(AtomicOrdering::SeqCst)
    }

    /// Drop every pending task.
    pub fn clear(&self) {
        let mut queue = self.queue.write();
        queue.heap.clear();
        queue.pending.clear();
        queue.cancelled.clear();
        drop(queue);

        self.stats.write().queue_size = 0;
    }

    pub fn queue_size(&self) -> usize {
        self.queue.read().heap.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.read().clone()
    }
}

impl<T> Default for RealtimeScheduler<T> {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

/// Static rate-monotonic priority for a declared period.
fn rate_priority(period: Duration) -> Priority {
    if period < Duration::from_millis(1) {
        Priority::Critical
    } else if period < Duration::from_millis(10) {
        Priority::High
    } else if period < Duration::from_millis(100) {
        Priority::Medium
    } else if period < Duration::from_secs(1) {
        Priority::Low
    } else {
        Priority::Background
    }
}
