//! Priority task queue (C1).
//!
//! A binary heap ordered by `(priority desc, arrival_time asc)`. Higher
//! priority always wins; among equal priorities, the task that arrived first
//! is popped first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use crate::error::{CoreError, Result};
use crate::task::Task;

/// Wraps a [`Task`] with the ordering key the heap compares on.
///
/// `std::collections::BinaryHeap` is a max-heap, so `Ord` is defined so that
/// "greater" means "should be popped first": higher priority is greater, and
/// for equal priority an earlier `arrival` is greater (we want FIFO among
/// equal priorities, i.e. the oldest entry surfaces first).
struct HeapEntry {
    priority: i64,
    arrival: Instant,
    task: Task,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.arrival == other.arrival
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.arrival.cmp(&self.arrival))
    }
}

/// Min-heap of pending [`Task`]s ordered by `(-priority, arrival_time)`.
pub struct PriorityTaskQueue {
    heap: BinaryHeap<HeapEntry>,
    default_priority: i64,
}

impl PriorityTaskQueue {
    /// Create an empty queue. Tasks submitted without a priority are given
    /// `default_priority`.
    pub fn new(default_priority: i64) -> Self {
        Self {
            heap: BinaryHeap::new(),
            default_priority,
        }
    }

    /// Add a task to the queue, stamping `arrival_time` and filling in the
    /// default priority if the task has none.
    pub fn add(&mut self, mut task: Task) {
        let priority = task.priority.unwrap_or(self.default_priority);
        task.priority = Some(priority);
        let arrival = Instant::now();
        task.arrival_time = Some(arrival);
        self.heap.push(HeapEntry {
            priority,
            arrival,
            task,
        });
    }

    /// Remove and return the highest-priority task (oldest first on ties).
    ///
    /// Fails explicitly if the queue is empty.
    pub fn pop(&mut self) -> Result<Task> {
        self.heap
            .pop()
            .map(|entry| entry.task)
            .ok_or(CoreError::QueueEmpty)
    }

    /// Return the highest-priority task without removing it.
    ///
    /// Fails explicitly if the queue is empty.
    pub fn peek(&self) -> Result<&Task> {
        self.heap
            .peek()
            .map(|entry| &entry.task)
            .ok_or(CoreError::QueueEmpty)
    }

    /// Number of tasks currently waiting.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// True iff no tasks are waiting.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(id: &str, priority: Option<i64>) -> Task {
        Task::new(id, json!({}), priority)
    }

    #[test]
    fn pops_highest_priority_first() {
        let mut q = PriorityTaskQueue::new(50);
        q.add(task("low", Some(1)));
        q.add(task("high", Some(9)));
        q.add(task("mid", Some(5)));

        assert_eq!(q.pop().unwrap().id, "high");
        assert_eq!(q.pop().unwrap().id, "mid");
        assert_eq!(q.pop().unwrap().id, "low");
    }

    #[test]
    fn ties_broken_by_arrival_order() {
        let mut q = PriorityTaskQueue::new(50);
        q.add(task("first", Some(3)));
        q.add(task("second", Some(3)));
        q.add(task("third", Some(3)));

        assert_eq!(q.pop().unwrap().id, "first");
        assert_eq!(q.pop().unwrap().id, "second");
        assert_eq!(q.pop().unwrap().id, "third");
    }

    #[test]
    fn unset_priority_gets_default() {
        let mut q = PriorityTaskQueue::new(42);
        q.add(task("t", None));
        assert_eq!(q.peek().unwrap().priority, Some(42));
    }

    #[test]
    fn pop_on_empty_fails_explicitly() {
        let mut q = PriorityTaskQueue::new(50);
        assert!(matches!(q.pop(), Err(CoreError::QueueEmpty)));
    }

    #[test]
    fn peek_on_empty_fails_explicitly() {
        let q = PriorityTaskQueue::new(50);
        assert!(matches!(q.peek(), Err(CoreError::QueueEmpty)));
    }

    #[test]
    fn peek_does_not_remove() {
        let mut q = PriorityTaskQueue::new(50);
        q.add(task("a", Some(1)));
        assert_eq!(q.peek().unwrap().id, "a");
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn len_and_empty() {
        let mut q = PriorityTaskQueue::new(50);
        assert!(q.is_empty());
        q.add(task("a", Some(1)));
        assert_eq!(q.len(), 1);
        assert!(!q.is_empty());
    }
}
