//! End-to-end broker scenarios driving the full submission -> dispatch ->
//! worker -> result path through a live [`BrokerHandle`].

use std::time::Duration;

use renderd_core::broker::{Broker, BrokerConfig};
use renderd_core::pool::WorkerPool;
use renderd_core::task::Task;
use renderd_core::worker::builtin_commands;
use serde_json::json;
use tokio::sync::mpsc;

fn spawn_broker(priorities: Vec<i64>, pool_size: usize) -> renderd_core::broker::BrokerHandle {
    let config = BrokerConfig {
        priorities,
        pool_size,
        default_priority: 10,
        check_interval: Duration::from_secs(30),
    };
    let pool = WorkerPool::new(pool_size, builtin_commands(), 256);
    let (handle, _join) = Broker::spawn(config, pool).unwrap();
    handle
}

#[tokio::test]
async fn priority_order_with_equal_priority_is_fifo() {
    let broker = spawn_broker(vec![0, 0, 0, 50], 4);
    let (tx, mut rx) = mpsc::channel(64);

    for i in 0..10 {
        let doc = json!({"command": "sleep", "time": 0.01 * (i as f64)});
        let task = Task::new(i.to_string(), doc, Some(0));
        broker.dispatch_with_channel(task, tx.clone()).await.unwrap();
    }
    drop(tx);

    let mut completion_order = vec![];
    for _ in 0..10 {
        let result = rx.recv().await.unwrap();
        completion_order.push(result.id.parse::<i32>().unwrap());
    }
    assert_eq!(completion_order, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn priority_reordering_lets_urgent_tasks_overtake() {
    let broker = spawn_broker(vec![0, 0, 0, 0], 4);
    let (tx, mut rx) = mpsc::channel(64);

    for i in 0..10 {
        let doc = json!({"command": "sleep", "time": 0.02});
        let task = Task::new(i.to_string(), doc, Some(i));
        broker.dispatch_with_channel(task, tx.clone()).await.unwrap();
    }
    drop(tx);

    let mut completion_order = vec![];
    for _ in 0..10 {
        let result = rx.recv().await.unwrap();
        completion_order.push(result.id.parse::<i32>().unwrap());
    }
    assert_ne!(completion_order, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn coalescing_delivers_same_result_to_every_duplicate() {
    let broker = spawn_broker(vec![0, 0, 0, 0], 4);
    let (tx, mut rx) = mpsc::channel(2048);

    for _ in 0..1000 {
        let doc = json!({"command": "sleep", "time": 1.0});
        let task = Task::new("99999", doc, Some(10));
        broker.dispatch_with_channel(task, tx.clone()).await.unwrap();
    }
    for i in 0..1000 {
        let doc = json!({"command": "echo"});
        let task = Task::new(format!("bg-{i}"), doc, Some(10));
        broker.dispatch_background(task).await.unwrap();
    }
    drop(tx);

    let mut received = 0;
    while let Some(result) = rx.recv().await {
        assert_eq!(result.id, "99999");
        received += 1;
    }
    assert_eq!(received, 1000);
}

#[tokio::test]
async fn background_tasks_complete_before_a_later_blocking_call_returns() {
    let broker = spawn_broker(vec![0, 0, 0, 0], 4);
    let dir = tempfile::tempdir().unwrap();

    let mut paths = vec![];
    for i in 0..10 {
        let path = dir.path().join(format!("file-{i}.tmp"));
        let doc = json!({"command": "touch_file", "path": path.to_str().unwrap()});
        broker
            .dispatch_background(Task::new(format!("touch-{i}"), doc, Some(0)))
            .await
            .unwrap();
        paths.push(path);
    }

    let sleep_task = Task::new("blocker", json!({"command": "sleep", "time": 0.05}), Some(0));
    broker.dispatch(sleep_task).await.unwrap();

    for path in paths {
        assert!(path.exists(), "{path:?} should exist once the blocking dispatch returns");
    }
}

#[tokio::test]
async fn admission_reservation_blocks_low_priority_until_threshold_clears() {
    let broker = spawn_broker(vec![0, 0, 10, 60], 4);

    let (tx, mut rx) = mpsc::channel(16);
    for (id, prio) in [("a", 0), ("b", 0), ("c", 10)] {
        let doc = json!({"command": "sleep", "time": 0.2});
        broker
            .dispatch_with_channel(Task::new(id, doc, Some(prio)), tx.clone())
            .await
            .unwrap();
    }

    // give the broker a moment to dispatch all three onto workers
    tokio::time::sleep(Duration::from_millis(30)).await;

    let status = broker.status().await.unwrap();
    assert_eq!(status.running, 3);

    let low = Task::new("low", json!({"command": "echo"}), Some(59));
    let high = Task::new("high", json!({"command": "echo"}), Some(60));

    let high_result = tokio::time::timeout(Duration::from_millis(500), broker.dispatch(high))
        .await
        .expect("priority-60 task should be dispatched immediately into the reserved slot");
    assert!(high_result.is_ok());

    // the low-priority task has to wait behind the reserved-slot task
    let low_result = tokio::time::timeout(Duration::from_secs(2), broker.dispatch(low)).await;
    assert!(low_result.is_ok());

    drop(tx);
    while rx.recv().await.is_some() {}
}

#[tokio::test]
async fn worker_error_is_delivered_as_a_normal_completion() {
    let broker = spawn_broker(vec![0], 1);
    let task = Task::new("boom", json!({"command": "exception"}), Some(0));
    let result = broker.dispatch(task).await.unwrap();
    assert_eq!(result.doc["status"], "error");
    assert!(result.doc["error_message"]
        .as_str()
        .unwrap()
        .contains("exception"));
}

#[tokio::test]
async fn status_reports_pool_size_and_queue_counters() {
    let broker = spawn_broker(vec![0, 0], 2);
    let status = broker.status().await.unwrap();
    assert_eq!(status.pool_size, 2);
    assert_eq!(status.running, 0);
    assert_eq!(status.waiting, 0);
}
