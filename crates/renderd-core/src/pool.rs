//! Worker pool (C5): owns a fixed set of worker tasks and the single
//! outbound channel they all share to report results.
//!
//! Workers here are `tokio` tasks rather than OS processes, matching the
//! async-task-based background work this runtime favors elsewhere. Pool
//! state (`processes`, `available`, `inuse`) is only ever touched from the
//! broker's single event loop, so it needs no internal locking.

use std::collections::{HashMap, HashSet};

use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::task::Task;
use crate::worker::{run_worker, CommandTable, WorkerMessage};

struct WorkerProcess {
    inbound: mpsc::Sender<WorkerMessage>,
    handle: JoinHandle<()>,
}

/// Fixed-size pool of worker tasks sharing one result channel.
pub struct WorkerPool {
    pool_size: usize,
    commands: CommandTable,
    processes: HashMap<Uuid, WorkerProcess>,
    available: HashSet<Uuid>,
    inuse: HashSet<Uuid>,
    /// `worker_id -> id` of the task currently in flight on that worker, so a
    /// crashed worker's in-progress task can be resolved with a synthetic
    /// error result instead of being silently lost.
    in_flight: HashMap<Uuid, Task>,
    result_tx: mpsc::Sender<Task>,
    result_rx: Option<mpsc::Receiver<Task>>,
}

impl WorkerPool {
    /// Construct a pool with no workers spawned yet; call
    /// [`WorkerPool::start_processes`] to bring it up to `pool_size`.
    pub fn new(pool_size: usize, commands: CommandTable, result_buffer: usize) -> Self {
        let (result_tx, result_rx) = mpsc::channel(result_buffer);
        Self {
            pool_size,
            commands,
            processes: HashMap::new(),
            available: HashSet::new(),
            inuse: HashSet::new(),
            in_flight: HashMap::new(),
            result_tx,
            result_rx: Some(result_rx),
        }
    }

    /// Take the shared result receiver. Must be called exactly once, before
    /// the pool is handed to the broker's fan-in.
    pub fn take_result_receiver(&mut self) -> mpsc::Receiver<Task> {
        self.result_rx
            .take()
            .expect("result receiver already taken")
    }

    /// True iff at least one worker is idle.
    pub fn is_available(&self) -> bool {
        !self.available.is_empty()
    }

    /// Claim one idle worker, moving it from `available` to `inuse`.
    ///
    /// Precondition: [`WorkerPool::is_available`]. Violating it is a
    /// programmer error.
    pub fn get(&mut self) -> Result<Uuid> {
        let worker_id = *self
            .available
            .iter()
            .next()
            .ok_or(CoreError::NoAvailableWorker)?;
        self.available.remove(&worker_id);
        self.inuse.insert(worker_id);
        Ok(worker_id)
    }

    /// Send `task` to `worker_id`'s inbound channel, recording it as
    /// in-flight for crash recovery.
    pub async fn dispatch(&mut self, worker_id: Uuid, mut task: Task) -> Result<()> {
        task.worker_id = Some(worker_id);
        self.in_flight.insert(worker_id, task.clone());
        let inbound = &self
            .processes
            .get(&worker_id)
            .ok_or_else(|| CoreError::Internal(format!("unknown worker {worker_id}")))?
            .inbound;
        inbound
            .send(WorkerMessage::Dispatch(task))
            .await
            .map_err(|_| CoreError::ChannelClosed("worker inbound"))
    }

    /// Return a worker to the idle set and clear its in-flight record.
    ///
    /// Idempotent: returning a worker that is already idle is a no-op rather
    /// than a bug, matching the original pool's lenient `put`. A `worker_id`
    /// no longer present in `processes` (already reaped by
    /// `clear_dead_processes`) is not re-admitted into `available` — doing
    /// so would resurrect a phantom slot that `get()` could hand out but
    /// `dispatch()` could never actually use.
    pub fn put(&mut self, worker_id: Uuid) {
        self.inuse.remove(&worker_id);
        self.in_flight.remove(&worker_id);
        if self.processes.contains_key(&worker_id) {
            self.available.insert(worker_id);
        }
    }

    /// Spawn workers until `processes` reaches `pool_size`.
    pub fn start_processes(&mut self) {
        while self.processes.len() < self.pool_size {
            let worker_id = Uuid::now_v7();
            let (inbound_tx, inbound_rx) = mpsc::channel(1);
            let outbound = self.result_tx.clone();
            let commands = self.commands.clone();
            let handle = tokio::spawn(run_worker(worker_id, inbound_rx, outbound, commands));
            self.processes.insert(
                worker_id,
                WorkerProcess {
                    inbound: inbound_tx,
                    handle,
                },
            );
            self.available.insert(worker_id);
        }
    }

    /// Remove any tracked worker whose task has finished, synthesizing an
    /// error result for whatever task it was running so the broker's normal
    /// delivery path still resolves waiting callers.
    pub async fn clear_dead_processes(&mut self) {
        let dead: Vec<Uuid> = self
            .processes
            .iter()
            .filter(|(_, process)| process.handle.is_finished())
            .map(|(id, _)| *id)
            .collect();

        for worker_id in dead {
            self.processes.remove(&worker_id);
            self.available.remove(&worker_id);
            self.inuse.remove(&worker_id);

            if let Some(task) = self.in_flight.remove(&worker_id) {
                let mut failed = task;
                failed.doc = json!({
                    "status": "error",
                    "error_message": format!("worker {worker_id} terminated unexpectedly"),
                });
                // The worker that produced this is already gone; leaving
                // `worker_id` set would make the broker try to `put()` a
                // dead slot back into `available`.
                failed.worker_id = None;
                let _ = self.result_tx.send(failed).await;
            }
        }
    }

    /// Self-healing tick: clear dead workers, then top the pool back up.
    pub async fn check_processes(&mut self) {
        self.clear_dead_processes().await;
        self.start_processes();
    }

    /// Stop every worker and clear all pool state.
    pub fn terminate_processes(&mut self) {
        for (_, process) in self.processes.drain() {
            let _ = process.inbound.try_send(WorkerMessage::Stop);
            process.handle.abort();
        }
        self.available.clear();
        self.inuse.clear();
        self.in_flight.clear();
    }

    /// Number of workers currently tracked (idle + busy).
    pub fn len(&self) -> usize {
        self.processes.len()
    }
}
