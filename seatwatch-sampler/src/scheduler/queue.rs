//! Priority time queue of pending sample tasks
//!
//! Min-heap on trigger time. The queue is not persisted: Sync rebuilds it
//! from the store on every pass.

use chrono::{DateTime, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// What a probe needs, resolved when the task is enqueued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskPayload {
    pub show_id: i64,
    pub provider: String,
    pub venue_id: i64,
    pub venue_name: String,
    pub venue_url: Option<String>,
    pub movie_id: i64,
    pub movie_title: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub detail_url: Option<String>,
    pub credential: Option<String>,
}

/// A scheduled probe of one showing
///
/// `window_end >= trigger` always holds for tasks built by Sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleTask {
    pub trigger: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub payload: TaskPayload,
}

impl SampleTask {
    /// Due once the trigger time is reached
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.trigger <= now
    }

    /// Expired once the window has closed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.window_end
    }
}

/// Heap entry ordered by trigger only
#[derive(Debug)]
struct QueueEntry(SampleTask);

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.trigger == other.0.trigger
    }
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Sort by trigger (earliest first once wrapped in Reverse)
        self.0.trigger.cmp(&other.0.trigger)
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Array-backed binary min-heap keyed by trigger time
///
/// Ties are popped in unspecified order.
#[derive(Debug, Default)]
pub struct TimeQueue {
    heap: BinaryHeap<Reverse<QueueEntry>>,
}

impl TimeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, task: SampleTask) {
        self.heap.push(Reverse(QueueEntry(task)));
    }

    /// Earliest task without removing it
    pub fn peek(&self) -> Option<&SampleTask> {
        self.heap.peek().map(|Reverse(entry)| &entry.0)
    }

    pub fn pop(&mut self) -> Option<SampleTask> {
        self.heap.pop().map(|Reverse(entry)| entry.0)
    }

    /// Pop every task whose trigger is at or before `now`, earliest first
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<SampleTask> {
        let mut due = Vec::new();
        while self.peek().is_some_and(|task| task.is_due(now)) {
            if let Some(task) = self.pop() {
                due.push(task);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
