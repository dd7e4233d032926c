//! Render queue (C3): composes the priority queue (C1) and the running-task
//! index (C2) under a priority-reservation admission policy.
//!
//! Placing admission here — rather than in the broker's event loop — keeps
//! the broker's dispatch step branch-free and localizes the invariant that a
//! reserved worker slot is never occupied by a task unworthy of it.

use crate::error::{CoreError, Result};
use crate::queue::PriorityTaskQueue;
use crate::running::RunningTaskIndex;
use crate::task::Task;

/// Sorted-ascending admission thresholds, one per worker slot.
///
/// `priorities[k]` is the minimum priority a task must have to be dispatched
/// when `k` workers are already busy. A task is never dispatched into a slot
/// whose threshold it fails to clear.
pub struct RenderQueue {
    pending: PriorityTaskQueue,
    running: RunningTaskIndex,
    priorities: Vec<i64>,
}

impl RenderQueue {
    /// Construct a render queue with the given admission vector and default
    /// priority for tasks submitted without one.
    ///
    /// `priorities` must be non-empty; it is sorted ascending on entry (the
    /// caller may hand it in any order) and its length defines the pool
    /// size the reservation policy reasons about.
    pub fn new(mut priorities: Vec<i64>, default_priority: i64) -> Result<Self> {
        if priorities.is_empty() {
            return Err(CoreError::EmptyPriorityVector);
        }
        priorities.sort_unstable();
        Ok(Self {
            pending: PriorityTaskQueue::new(default_priority),
            running: RunningTaskIndex::new(),
            priorities,
        })
    }

    /// Admit `task` into the pending queue.
    ///
    /// Rejects a task whose explicit priority is below the lowest admission
    /// threshold — such a task could never be dispatched.
    pub fn add(&mut self, task: Task) -> Result<()> {
        if let Some(priority) = task.priority {
            let floor = self.priorities[0];
            if priority < floor {
                return Err(CoreError::PriorityBelowFloor { priority, floor });
            }
        }
        self.pending.add(task);
        Ok(())
    }

    /// True iff the highest-priority pending task clears the admission
    /// threshold for the current number of running tasks.
    pub fn has_new_tasks(&self) -> bool {
        let k = self.running.len();
        if k >= self.priorities.len() {
            return false;
        }
        match self.pending.peek() {
            Ok(task) => task.priority.unwrap_or(i64::MIN) >= self.priorities[k],
            Err(_) => false,
        }
    }

    /// Pop the next admissible task, moving it from C1 into C2.
    ///
    /// Precondition: [`RenderQueue::has_new_tasks`] is true. Violating this
    /// is a programmer error and surfaces as [`CoreError::QueueEmpty`].
    pub fn next(&mut self) -> Result<Task> {
        let task = self.pending.pop()?;
        self.running.add(task.clone());
        Ok(task)
    }

    /// True iff another task sharing `task`'s `id` is already running.
    ///
    /// Because `next()` inserts the task into C2 before this is checked,
    /// a task is considered "already running" only if at least one *other*
    /// task with the same id also occupies the group.
    pub fn already_running(&self, task: &Task) -> bool {
        self.running.group_len(&task.id) >= 2
    }

    /// Remove and return every task coalesced under `id`.
    pub fn remove(&mut self, id: &str) -> Result<Vec<Task>> {
        self.running.remove(id)
    }

    /// Number of distinct task ids currently running.
    pub fn running(&self) -> usize {
        self.running.len()
    }

    /// Number of tasks waiting to be admitted.
    pub fn waiting(&self) -> usize {
        self.pending.len()
    }
}
