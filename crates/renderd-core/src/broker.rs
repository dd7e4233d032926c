//! The broker (C6): a single event loop that owns the render queue and the
//! worker pool, and is the only task in the system that ever mutates them.
//!
//! Every other part of the system — HTTP handlers, background submitters —
//! talks to the broker only by sending on its submission channel and,
//! optionally, awaiting its own private response channel. This is the
//! serialization point the rest of the crate is built around.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::fanin::{fan_in, Tagged};
use crate::pool::WorkerPool;
use crate::render_queue::RenderQueue;
use crate::task::Task;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// A point-in-time readout of broker state, for `GET /status` and similar.
#[derive(Debug, Clone, Copy)]
pub struct Status {
    pub running: usize,
    pub waiting: usize,
    pub pool_size: usize,
}

/// What arrives on the broker's submission channel.
enum Submission {
    Dispatch(Task, Option<mpsc::Sender<Task>>),
    Status(mpsc::Sender<Status>),
    Stop,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Source {
    Submission,
    Result,
}

/// A cheaply-cloneable handle used by submitters to talk to a running
/// broker. The broker event loop itself is not exposed; only this handle is.
#[derive(Clone)]
pub struct BrokerHandle {
    submission_tx: mpsc::Sender<Submission>,
}

impl BrokerHandle {
    /// Synchronous dispatch: submit `task`, suspend until the result arrives.
    ///
    /// Used by HTTP handlers that must reply with the result document.
    pub async fn dispatch(&self, task: Task) -> Result<Task> {
        let (tx, mut rx) = mpsc::channel(1);
        self.submission_tx
            .send(Submission::Dispatch(task, Some(tx)))
            .await
            .map_err(|_| CoreError::BrokerShutdown)?;
        rx.recv().await.ok_or(CoreError::ChannelClosed("response"))
    }

    /// Asynchronous dispatch: submit `task` and a response channel, return
    /// immediately. The caller reads the eventual result off `response_tx`'s
    /// paired receiver at its own pace.
    pub async fn dispatch_with_channel(
        &self,
        task: Task,
        response_tx: mpsc::Sender<Task>,
    ) -> Result<()> {
        self.submission_tx
            .send(Submission::Dispatch(task, Some(response_tx)))
            .await
            .map_err(|_| CoreError::BrokerShutdown)
    }

    /// Fire-and-forget dispatch: submit `task`, discard its result.
    pub async fn dispatch_background(&self, task: Task) -> Result<()> {
        self.submission_tx
            .send(Submission::Dispatch(task, None))
            .await
            .map_err(|_| CoreError::BrokerShutdown)
    }

    /// Read a snapshot of queue/pool counters.
    pub async fn status(&self) -> Result<Status> {
        let (tx, mut rx) = mpsc::channel(1);
        self.submission_tx
            .send(Submission::Status(tx))
            .await
            .map_err(|_| CoreError::BrokerShutdown)?;
        rx.recv().await.ok_or(CoreError::ChannelClosed("status"))
    }

    /// Request a cooperative shutdown: the broker drains running tasks and
    /// exits once nothing remains in flight. Submissions sent after this are
    /// not guaranteed to be processed.
    pub async fn shutdown(&self) -> Result<()> {
        self.submission_tx
            .send(Submission::Stop)
            .await
            .map_err(|_| CoreError::BrokerShutdown)
    }
}

/// Tunable parameters for a broker instance.
pub struct BrokerConfig {
    /// Sorted-ascending admission thresholds, one per worker slot.
    pub priorities: Vec<i64>,
    pub pool_size: usize,
    pub default_priority: i64,
    pub check_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            priorities: vec![50],
            pool_size: 1,
            default_priority: 10,
            check_interval: Duration::from_secs(30),
        }
    }
}

/// Owns the render queue and worker pool; runs as one dedicated task.
pub struct Broker {
    render_queue: RenderQueue,
    worker_pool: WorkerPool,
    response_queues: HashMap<Uuid, Option<mpsc::Sender<Task>>>,
    check_interval: Duration,
}

impl Broker {
    /// Construct and spawn a broker, returning a handle to it.
    ///
    /// `worker_pool` should already have its commands configured via
    /// [`WorkerPool::new`]; this call takes its result receiver and starts
    /// its worker tasks.
    pub fn spawn(
        config: BrokerConfig,
        mut worker_pool: WorkerPool,
    ) -> Result<(BrokerHandle, JoinHandle<()>)> {
        let render_queue = RenderQueue::new(config.priorities, config.default_priority)?;
        let result_rx = worker_pool.take_result_receiver();
        worker_pool.start_processes();

        let (submission_tx, submission_rx) = mpsc::channel(1024);
        let submission_events = map_channel(submission_rx, 1024, Event::Submission);
        let result_events = map_channel(result_rx, 1024, Event::Result);
        let merged = fan_in(
            vec![
                (Source::Submission, submission_events),
                (Source::Result, result_events),
            ],
            1024,
        );

        let broker = Broker {
            render_queue,
            worker_pool,
            response_queues: HashMap::new(),
            check_interval: config.check_interval,
        };

        let handle = tokio::spawn(broker.run(merged));
        Ok((BrokerHandle { submission_tx }, handle))
    }

    async fn run(mut self, mut events: mpsc::Receiver<Tagged<Source, Event>>) {
        let mut shutdown_requested = false;
        let mut next_check = tokio::time::Instant::now() + self.check_interval;

        loop {
            if tokio::time::Instant::now() >= next_check {
                self.worker_pool.check_processes().await;
                next_check = tokio::time::Instant::now() + self.check_interval;
            }

            let event = match tokio::time::timeout(DEFAULT_READ_TIMEOUT, events.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    tracing::error!("broker event source closed unexpectedly");
                    return;
                }
                Err(_) => continue,
            };

            match event.item {
                Event::Submission(Submission::Stop) => {
                    tracing::info!("shutdown requested");
                    shutdown_requested = true;
                }
                Event::Submission(Submission::Status(reply)) => {
                    let _ = reply
                        .send(Status {
                            running: self.render_queue.running(),
                            waiting: self.render_queue.waiting(),
                            pool_size: self.worker_pool.len(),
                        })
                        .await;
                }
                Event::Submission(Submission::Dispatch(task, response_tx)) => {
                    tracing::debug!(task = %task.id, priority = ?task.priority, "new task");
                    match self.render_queue.add(task.clone()) {
                        Ok(()) => {
                            self.response_queues.insert(task.request_id, response_tx);
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, task = %task.id, "rejected submission at admission boundary");
                            if let Some(response_tx) = response_tx {
                                let mut rejected = task;
                                rejected.doc = json!({
                                    "status": "error",
                                    "error_message": err.to_string(),
                                });
                                let _ = response_tx.send(rejected).await;
                            }
                        }
                    }
                }
                Event::Result(result) => {
                    tracing::debug!(worker = %result.worker_id.unwrap_or(Uuid::nil()), task = %result.id, "result received");
                    if let Some(worker_id) = result.worker_id {
                        self.worker_pool.put(worker_id);
                    }
                    match self.render_queue.remove(&result.id) {
                        Ok(group) => {
                            for member in group {
                                if let Some(response_tx) =
                                    self.response_queues.remove(&member.request_id).flatten()
                                {
                                    let _ = response_tx.send(result.clone()).await;
                                }
                            }
                        }
                        Err(err) => {
                            tracing::error!(error = %err, id = %result.id, "result for unknown task group");
                        }
                    }
                }
            }

            // Dispatch step: keep skipping coalesced duplicates (they were
            // already recorded as running by `next()` and consume no worker
            // slot) until either a genuine dispatch happens or nothing more
            // is admissible right now.
            loop {
                if self.render_queue.has_new_tasks() && self.worker_pool.is_available() {
                    let task = match self.render_queue.next() {
                        Ok(task) => task,
                        Err(err) => {
                            tracing::error!(error = %err, "has_new_tasks true but next() failed");
                            break;
                        }
                    };
                    if self.render_queue.already_running(&task) {
                        tracing::info!(task = %task.id, running = self.render_queue.running(), waiting = self.render_queue.waiting(), "coalesced, not dispatching");
                        continue;
                    }
                    tracing::info!(task = %task.id, priority = ?task.priority, running = self.render_queue.running(), waiting = self.render_queue.waiting(), "dispatching");
                    match self.worker_pool.get() {
                        Ok(worker_id) => {
                            if let Err(err) = self.worker_pool.dispatch(worker_id, task).await {
                                tracing::error!(error = %err, "failed to dispatch to worker");
                            }
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "is_available() true but get() failed");
                        }
                    }
                }
                break;
            }

            if shutdown_requested
                && self.render_queue.running() == 0
                && !self.render_queue.has_new_tasks()
            {
                tracing::info!("drained, exiting");
                self.worker_pool.terminate_processes();
                return;
            }
        }
    }
}

/// Internal event shape threaded through the fan-in; kept distinct from
/// [`Submission`] so the worker-result arm of the match doesn't need to
/// wrap its `Task` in an extra variant of `Submission`.
enum Event {
    Submission(Submission),
    Result(Task),
}

/// Adapt a `Receiver<T>` into a `Receiver<U>` by mapping each item through
/// `f` in its own forwarder task, so heterogeneous channels (submissions,
/// worker results) can be merged by the uniformly-typed [`fan_in`].
fn map_channel<T, U>(
    mut rx: mpsc::Receiver<T>,
    buffer: usize,
    f: impl Fn(T) -> U + Send + 'static,
) -> mpsc::Receiver<U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    let (tx, mapped_rx) = mpsc::channel(buffer);
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            if tx.send(f(item)).await.is_err() {
                break;
            }
        }
    });
    mapped_rx
}
