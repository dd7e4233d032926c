//! The [`Task`] data model shared by every component in this crate.
//!
//! A `Task` is immutable after submission except for two fields the queue and
//! broker stamp onto it during its lifecycle: `priority` (filled in with the
//! default if the submitter left it unset) and `worker_id` (filled in when
//! the broker dispatches it to a worker).

use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

/// One unit of work submitted to the broker.
///
/// Two tasks that share the same `id` are considered equivalent work (e.g.
/// requests for the same meta-tile): the render queue coalesces them so a
/// single execution satisfies every caller.
#[derive(Debug, Clone)]
pub struct Task {
    /// Logical identifier. Tasks sharing an `id` are coalesced.
    pub id: String,

    /// Globally unique identifier for this particular submission, used to
    /// route the eventual result back to the right caller.
    pub request_id: Uuid,

    /// Opaque payload: the command name and its arguments on submission, the
    /// result document on return.
    pub doc: Value,

    /// `None` until the task is admitted into [`crate::queue::PriorityTaskQueue`],
    /// at which point the configured default is filled in if the submitter
    /// left it unset.
    pub priority: Option<i64>,

    /// Stamped by the priority queue at insertion time; used only as a
    /// tiebreaker between equal-priority tasks. `None` until enqueued.
    pub arrival_time: Option<Instant>,

    /// Set by the broker when the task is dispatched to a worker.
    pub worker_id: Option<Uuid>,
}

impl Task {
    /// Create a new task ready for submission to the broker.
    ///
    /// `priority` may be `None`, in which case the render queue assigns its
    /// configured default priority when the task is added.
    pub fn new(id: impl Into<String>, doc: Value, priority: Option<i64>) -> Self {
        Self {
            id: id.into(),
            request_id: Uuid::now_v7(),
            doc,
            priority,
            arrival_time: None,
            worker_id: None,
        }
    }

    /// The `command` field of [`Task::doc`], or `""` if absent or not a string.
    pub fn command(&self) -> &str {
        self.doc.get("command").and_then(Value::as_str).unwrap_or("")
    }
}
