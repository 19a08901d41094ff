//! Policy-aware priority queue entries.

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use crate::{ScheduledTask, SchedulingPolicy};

/// Heap entry pairing a task with the scheduler's policy.
///
/// `BinaryHeap` is a max-heap, so `cmp` computes the policy's ascending
/// rank and reverses it: the entry that must dequeue first is "greatest".
/// Every rank ends with ascending task id, which keeps dequeue order FIFO
/// among otherwise equal tasks.
pub(crate) struct QueueEntry<T> {
    pub task: ScheduledTask<T>,
    pub policy: SchedulingPolicy,
}

impl<T> QueueEntry<T> {
    /// Deadline minus estimated runtime. `now` is common to every queued
    /// task at any comparison instant, so ordering by this static key is
    /// exactly the least-laxity order without per-dequeue recomputation.
    fn slack_key(&self) -> Instant {
        self.task
            .deadline
            .at
            .checked_sub(self.task.estimated_runtime)
            .unwrap_or(self.task.deadline.at)
    }

    /// Declared period for rate-monotonic ranking; aperiodic tasks sort
    /// after every periodic one.
    fn period_key(&self) -> Duration {
        self.task.period.unwrap_or(Duration::MAX)
    }
}

impl<T> PartialEq for QueueEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.task.id == other.task.id
    }
}

impl<T> Eq for QueueEntry<T> {}

impl<T> PartialOrd for QueueEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for QueueEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank = match self.policy {
            SchedulingPolicy::EarliestDeadlineFirst => self
                .task
                .deadline
                .at
                .cmp(&other.task.deadline.at)
                .then_with(|| other.task.priority.cmp(&self.task.priority))
                .then_with(|| self.task.id.cmp(&other.task.id)),
            SchedulingPolicy::LeastLaxityFirst => self
                .slack_key()
                .cmp(&other.slack_key())
                .then_with(|| other.task.priority.cmp(&self.task.priority))
                .then_with(|| self.task.id.cmp(&other.task.id)),
            SchedulingPolicy::RateMonotonic => self
                .period_key()
                .cmp(&other.period_key())
                .then_with(|| other.task.priority.cmp(&self.task.priority))
                .then_with(|| self.task.id.cmp(&other.task.id)),
            SchedulingPolicy::FixedPriority => other
                .task
                .priority
                .cmp(&self.task.priority)
                .then_with(|| self.task.id.cmp(&other.task.id)),
        };
        rank.reverse()
    }
}
