//! Worker runtime (C7): the async task that actually executes a [`Task`]'s
//! command and reports the result.
//!
//! Handlers are resolved through an explicit `command name -> handler` map
//! built once at pool construction — no reflection, no dynamic dispatch by
//! string beyond that one lookup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::task::Task;

/// A single worker command implementation.
///
/// Input is the task's request document; output is either an empty object
/// (treated as success) or a document that may set its own `status`.
/// Returning `Err` is equivalent to the handler raising: the worker turns it
/// into an error result document, the caller never sees a panic.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn call(&self, doc: &Value) -> Result<Value, String>;
}

/// Message sent to a worker on its private inbound channel.
pub enum WorkerMessage {
    Dispatch(Task),
    Stop,
}

/// Immutable `command name -> handler` table, shared (via `Arc`) by every
/// worker task in a pool.
#[derive(Clone)]
pub struct CommandTable {
    handlers: Arc<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(HashMap::new()),
        }
    }

    pub fn register(mut self, name: impl Into<String>, handler: impl CommandHandler + 'static) -> Self {
        Arc::get_mut(&mut self.handlers)
            .expect("CommandTable::register must run before the table is shared")
            .insert(name.into(), Arc::new(handler));
        self
    }

    fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(name).cloned()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The command table shipped with this repo: stand-ins for the real
/// cache/tile rendering logic that lives outside this crate's scope.
pub fn builtin_commands() -> CommandTable {
    CommandTable::new()
        .register("sleep", SleepHandler)
        .register("echo", EchoHandler)
        .register("touch_file", TouchFileHandler)
        .register("exception", ExceptionHandler)
}

struct SleepHandler;

#[async_trait]
impl CommandHandler for SleepHandler {
    async fn call(&self, doc: &Value) -> Result<Value, String> {
        let seconds = doc.get("time").and_then(Value::as_f64).unwrap_or(0.0);
        tokio::time::sleep(std::time::Duration::from_secs_f64(seconds.max(0.0))).await;
        Ok(json!({}))
    }
}

struct EchoHandler;

#[async_trait]
impl CommandHandler for EchoHandler {
    async fn call(&self, doc: &Value) -> Result<Value, String> {
        Ok(doc.clone())
    }
}

struct TouchFileHandler;

#[async_trait]
impl CommandHandler for TouchFileHandler {
    async fn call(&self, doc: &Value) -> Result<Value, String> {
        let path = doc
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| "touch_file requires a 'path' field".to_string())?;
        tokio::fs::File::create(path)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({}))
    }
}

struct ExceptionHandler;

#[async_trait]
impl CommandHandler for ExceptionHandler {
    async fn call(&self, _doc: &Value) -> Result<Value, String> {
        Err("deliberate failure from the 'exception' demonstration command".to_string())
    }
}

/// Build the error result document for an unknown command name.
fn unknown_command_doc(command: &str) -> Value {
    json!({
        "status": "error",
        "error_message": format!("unknown command: {command}"),
    })
}

/// Build the error result document for a handler that returned `Err`.
fn handler_failure_doc(command: &str, message: &str) -> Value {
    json!({
        "status": "error",
        "error_message": format!("exception while processing '{command}': {message}"),
        "error_detail": message,
    })
}

/// Run one handler invocation against `task`, returning the result document
/// that replaces `task.doc`.
async fn execute(commands: &CommandTable, task: &Task) -> Value {
    let command = task.command().to_string();
    let Some(handler) = commands.get(&command) else {
        return unknown_command_doc(&command);
    };

    match handler.call(&task.doc).await {
        Ok(value) => {
            let mut value = if value.is_null() { json!({}) } else { value };
            if value.get("status").is_none() {
                if let Value::Object(map) = &mut value {
                    map.insert("status".to_string(), Value::String("ok".to_string()));
                }
            }
            value
        }
        Err(message) => handler_failure_doc(&command, &message),
    }
}

/// The worker's main loop: receive, execute, report, repeat until `Stop` or
/// the inbound channel closes.
pub async fn run_worker(
    id: Uuid,
    mut inbound: mpsc::Receiver<WorkerMessage>,
    outbound: mpsc::Sender<Task>,
    commands: CommandTable,
) {
    loop {
        let message = match inbound.recv().await {
            Some(message) => message,
            None => {
                tracing::debug!(worker = %id, "inbound channel closed, exiting");
                return;
            }
        };

        let mut task = match message {
            WorkerMessage::Stop => {
                tracing::debug!(worker = %id, "received stop, exiting");
                return;
            }
            WorkerMessage::Dispatch(task) => task,
        };

        tracing::debug!(worker = %id, task = %task.id, command = task.command(), "executing");
        task.doc = execute(&commands, &task).await;
        task.worker_id = Some(id);

        if outbound.send(task).await.is_err() {
            tracing::warn!(worker = %id, "result channel closed, exiting");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn echo_returns_doc_verbatim_with_ok_status() {
        let commands = builtin_commands();
        let task = Task::new("t", json!({"command": "echo", "value": 42}), Some(10));
        let result = execute(&commands, &task).await;
        assert_eq!(result["value"], 42);
        assert_eq!(result["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_command_produces_error_doc() {
        let commands = builtin_commands();
        let task = Task::new("t", json!({"command": "nonexistent"}), Some(10));
        let result = execute(&commands, &task).await;
        assert_eq!(result["status"], "error");
        assert!(result["error_message"]
            .as_str()
            .unwrap()
            .contains("unknown command"));
    }

    #[tokio::test]
    async fn exception_handler_produces_error_doc_with_detail() {
        let commands = builtin_commands();
        let task = Task::new("t", json!({"command": "exception"}), Some(10));
        let result = execute(&commands, &task).await;
        assert_eq!(result["status"], "error");
        assert!(result.get("error_detail").is_some());
    }

    #[tokio::test]
    async fn touch_file_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.tmp");
        let commands = builtin_commands();
        let task = Task::new(
            "t",
            json!({"command": "touch_file", "path": path.to_str().unwrap()}),
            Some(10),
        );
        let result = execute(&commands, &task).await;
        assert_eq!(result["status"], "ok");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn worker_loop_exits_on_stop() {
        let (inbound_tx, inbound_rx) = mpsc::channel(1);
        let (outbound_tx, _outbound_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run_worker(
            Uuid::now_v7(),
            inbound_rx,
            outbound_tx,
            builtin_commands(),
        ));
        inbound_tx.send(WorkerMessage::Stop).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn worker_loop_executes_and_reports_result() {
        let (inbound_tx, inbound_rx) = mpsc::channel(1);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(1);
        let worker_id = Uuid::now_v7();
        let handle = tokio::spawn(run_worker(
            worker_id,
            inbound_rx,
            outbound_tx,
            builtin_commands(),
        ));

        let task = Task::new("t", json!({"command": "echo", "value": 1}), Some(10));
        inbound_tx.send(WorkerMessage::Dispatch(task)).await.unwrap();
        let result = outbound_rx.recv().await.unwrap();
        assert_eq!(result.doc["value"], 1);
        assert_eq!(result.worker_id, Some(worker_id));

        inbound_tx.send(WorkerMessage::Stop).await.unwrap();
        handle.await.unwrap();
    }
}
