//! Queue manager behavior: ordering, deduplication, archival and run-state.

mod common;

use common::{
    manager, manager_with, observed_manager, queue_ids, task, task_with, wait_idle, Behavior,
    FixedMetadata, ScriptedExecutor,
};
use installq::database::MemoryStore;
use installq::queue::{
    FinishedRecord, FinishedStatus, LogNotifier, QueueEvent, RunState, TaskId, TaskKind,
};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_single_task_is_archived_as_done() {
    let executor = Arc::new(ScriptedExecutor::new());
    let qm = manager(executor.clone());

    qm.enqueue(task("X")).await.unwrap();
    wait_idle(&qm).await;

    let snapshot = qm.snapshot().await.unwrap();
    assert!(snapshot.queue.is_empty());
    assert_eq!(snapshot.finished.len(), 1);
    assert_eq!(snapshot.finished[0].id().as_str(), "X");
    assert_eq!(snapshot.finished[0].status, FinishedStatus::Done);
    assert_eq!(snapshot.finished[0].element.kind, TaskKind::Install);
    assert!(snapshot.finished[0].finished_at >= snapshot.finished[0].started_at);
    assert_eq!(executor.call_ids(), ["X"]);
}

#[tokio::test]
async fn test_reenqueue_before_start_replaces_parameters() {
    let (executor, gate) = ScriptedExecutor::gated();
    let executor = Arc::new(executor);
    let qm = manager(executor.clone());

    // A occupies the executor so X stays pending
    qm.enqueue(task("A")).await.unwrap();
    executor.wait_for_calls(1).await;

    qm.enqueue(task_with("X", "param", json!(1))).await.unwrap();
    qm.enqueue(task_with("X", "param", json!(2))).await.unwrap();

    let queue = qm.snapshot().await.unwrap().queue;
    assert_eq!(queue_ids(&queue), ["A", "X"]);
    assert_eq!(queue[1].params.extra["param"], json!(2));

    gate.add_permits(2);
    wait_idle(&qm).await;

    let calls = executor.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].params.extra["param"], json!(2));
}

#[tokio::test]
async fn test_update_keeps_queue_position() {
    let (executor, gate) = ScriptedExecutor::gated();
    let executor = Arc::new(executor);
    let qm = manager(executor.clone());

    for id in ["A", "B", "C", "D"] {
        qm.enqueue(task(id)).await.unwrap();
    }
    executor.wait_for_calls(1).await;

    let mut update = task("B");
    update.kind = TaskKind::Update;
    qm.enqueue(update).await.unwrap();

    let queue = qm.snapshot().await.unwrap().queue;
    assert_eq!(queue_ids(&queue), ["A", "B", "C", "D"]);
    assert_eq!(queue[1].kind, TaskKind::Update);

    gate.add_permits(4);
    wait_idle(&qm).await;
    assert_eq!(executor.call_ids(), ["A", "B", "C", "D"]);
    assert_eq!(executor.calls()[1].kind, TaskKind::Update);
}

#[tokio::test]
async fn test_tasks_run_in_fifo_order_one_at_a_time() {
    let (executor, gate) = ScriptedExecutor::gated();
    let executor = Arc::new(executor);
    let qm = manager(executor.clone());

    for id in ["A", "B", "C"] {
        qm.enqueue(task(id)).await.unwrap();
    }
    executor.wait_for_calls(1).await;
    assert_eq!(qm.current_task().await, Some(TaskId::new("A")));
    assert_eq!(qm.run_state(), RunState::Running);

    gate.add_permits(3);
    wait_idle(&qm).await;

    assert_eq!(executor.call_ids(), ["A", "B", "C"]);
    assert_eq!(executor.max_in_flight(), 1);

    let finished = qm.snapshot().await.unwrap().finished;
    let ids: Vec<&str> = finished.iter().map(|r| r.id().as_str()).collect();
    assert_eq!(ids, ["A", "B", "C"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_enqueues_start_a_single_loop() {
    const N: usize = 25;
    let executor = Arc::new(ScriptedExecutor::new());
    let qm = manager(executor.clone());

    let mut handles = Vec::new();
    for i in 0..N {
        let qm = qm.clone();
        handles.push(tokio::spawn(async move {
            qm.enqueue(task(&format!("task-{}", i))).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    wait_idle(&qm).await;

    let mut calls = executor.call_ids();
    assert_eq!(calls.len(), N, "every task runs exactly once");
    calls.sort();
    calls.dedup();
    assert_eq!(calls.len(), N);
    assert_eq!(executor.max_in_flight(), 1, "never two executor calls at once");

    let snapshot = qm.snapshot().await.unwrap();
    assert!(snapshot.queue.is_empty());
    assert_eq!(snapshot.finished.len(), N);
}

#[tokio::test]
async fn test_second_completion_overwrites_history() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .script("X", Behavior::Report(Some(FinishedStatus::Error)))
            .script("X", Behavior::Report(Some(FinishedStatus::Done))),
    );
    let qm = manager(executor.clone());

    qm.enqueue(task("Y")).await.unwrap();
    qm.enqueue(task("X")).await.unwrap();
    wait_idle(&qm).await;
    let first = qm.snapshot().await.unwrap().finished;
    assert_eq!(first[1].status, FinishedStatus::Error);

    qm.enqueue(task("X")).await.unwrap();
    wait_idle(&qm).await;

    let finished = qm.snapshot().await.unwrap().finished;
    assert_eq!(finished.len(), 2);
    // overwritten in place, not moved to the end
    assert_eq!(finished[1].id().as_str(), "X");
    assert_eq!(finished[1].status, FinishedStatus::Done);
}

#[tokio::test]
async fn test_archive_overwrites_record_for_same_id() {
    let qm = manager(Arc::new(ScriptedExecutor::new()));
    let record = |status| FinishedRecord {
        element: task("X"),
        status,
        started_at: chrono::Utc::now(),
        finished_at: chrono::Utc::now(),
        error: None,
    };

    qm.archive(record(FinishedStatus::Abort)).await.unwrap();
    qm.archive(record(FinishedStatus::Done)).await.unwrap();

    let finished = qm.snapshot().await.unwrap().finished;
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].status, FinishedStatus::Done);
    assert_eq!(qm.run_state(), RunState::Idle);
}

#[tokio::test]
async fn test_goes_idle_and_restarts() {
    let executor = Arc::new(ScriptedExecutor::new());
    let qm = manager(executor.clone());
    assert_eq!(qm.run_state(), RunState::Idle);

    qm.enqueue(task("A")).await.unwrap();
    wait_idle(&qm).await;
    assert_eq!(qm.run_state(), RunState::Idle);
    assert_eq!(qm.current_task().await, None);

    qm.enqueue(task("B")).await.unwrap();
    wait_idle(&qm).await;

    assert_eq!(executor.call_ids(), ["A", "B"]);
    assert_eq!(qm.snapshot().await.unwrap().finished.len(), 2);
}

#[tokio::test]
async fn test_missing_status_is_recorded_as_abort() {
    let executor = Arc::new(ScriptedExecutor::new().script("X", Behavior::Report(None)));
    let qm = manager(executor);

    qm.enqueue(task("X")).await.unwrap();
    wait_idle(&qm).await;

    let finished = qm.snapshot().await.unwrap().finished;
    assert_eq!(finished[0].status, FinishedStatus::Abort);
}

#[tokio::test]
async fn test_executor_failure_does_not_stop_the_queue() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .script("A", Behavior::Fail("download interrupted".to_string()))
            .script("B", Behavior::Panic),
    );
    let qm = manager(executor.clone());

    for id in ["A", "B", "C"] {
        qm.enqueue(task(id)).await.unwrap();
    }
    wait_idle(&qm).await;

    assert_eq!(executor.call_ids(), ["A", "B", "C"]);
    let finished = qm.snapshot().await.unwrap().finished;
    assert_eq!(finished[0].status, FinishedStatus::Error);
    assert!(finished[0]
        .error
        .as_deref()
        .unwrap()
        .contains("download interrupted"));
    assert_eq!(finished[1].status, FinishedStatus::Error);
    assert!(finished[1].error.is_some());
    assert_eq!(finished[2].status, FinishedStatus::Done);
}

#[tokio::test]
async fn test_empty_id_is_ignored() {
    let executor = Arc::new(ScriptedExecutor::new());
    let (qm, mut events) = observed_manager(executor.clone());

    qm.enqueue(task("")).await.unwrap();
    qm.dequeue_by_id(&TaskId::new("")).await.unwrap();

    assert_eq!(qm.run_state(), RunState::Idle);
    assert!(qm.snapshot().await.unwrap().queue.is_empty());
    assert!(events.try_recv().is_err());
    assert!(executor.call_ids().is_empty());
}

#[tokio::test]
async fn test_dequeue_unknown_id_still_notifies() {
    let (executor, gate) = ScriptedExecutor::gated();
    let executor = Arc::new(executor);
    let (qm, mut events) = observed_manager(executor.clone());

    qm.enqueue(task("A")).await.unwrap();
    executor.wait_for_calls(1).await;
    while events.try_recv().is_ok() {}

    qm.dequeue_by_id(&TaskId::new("nope")).await.unwrap();

    match events.try_recv().unwrap() {
        QueueEvent::QueueChanged { elements, .. } => assert_eq!(queue_ids(&elements), ["A"]),
        other => panic!("unexpected event {:?}", other),
    }

    gate.add_permits(1);
    wait_idle(&qm).await;
}

#[tokio::test]
async fn test_dequeue_before_any_queue_exists_is_silent() {
    let (qm, mut events) = observed_manager(Arc::new(ScriptedExecutor::new()));

    qm.dequeue_by_id(&TaskId::new("X")).await.unwrap();

    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_dequeued_pending_task_never_runs() {
    let (executor, gate) = ScriptedExecutor::gated();
    let executor = Arc::new(executor);
    let qm = manager(executor.clone());

    for id in ["A", "B", "C"] {
        qm.enqueue(task(id)).await.unwrap();
    }
    executor.wait_for_calls(1).await;

    qm.dequeue_by_id(&TaskId::new("B")).await.unwrap();
    assert_eq!(queue_ids(&qm.snapshot().await.unwrap().queue), ["A", "C"]);

    gate.add_permits(2);
    wait_idle(&qm).await;

    assert_eq!(executor.call_ids(), ["A", "C"]);
    let finished = qm.snapshot().await.unwrap().finished;
    assert!(finished.iter().all(|r| r.id().as_str() != "B"));
}

#[tokio::test]
async fn test_cancel_running_task_records_abort() {
    let (executor, gate) = ScriptedExecutor::gated();
    let executor = Arc::new(executor);
    let qm = manager(executor.clone());

    qm.enqueue(task("A")).await.unwrap();
    qm.enqueue(task("B")).await.unwrap();
    executor.wait_for_calls(1).await;

    qm.cancel(&TaskId::new("A")).await.unwrap();
    // a permit is available before A wakes up again; cancellation still wins
    // and the permit is left for B
    gate.add_permits(1);
    wait_idle(&qm).await;

    let snapshot = qm.snapshot().await.unwrap();
    assert!(snapshot.queue.is_empty());
    let finished: Vec<(&str, FinishedStatus)> = snapshot
        .finished
        .iter()
        .map(|r| (r.id().as_str(), r.status))
        .collect();
    assert_eq!(
        finished,
        [("A", FinishedStatus::Abort), ("B", FinishedStatus::Done)]
    );
    assert_eq!(executor.call_ids(), ["A", "B"]);
}

#[tokio::test]
async fn test_cancel_pending_task_leaves_running_one_alone() {
    let (executor, gate) = ScriptedExecutor::gated();
    let executor = Arc::new(executor);
    let qm = manager(executor.clone());

    qm.enqueue(task("A")).await.unwrap();
    qm.enqueue(task("B")).await.unwrap();
    executor.wait_for_calls(1).await;

    qm.cancel(&TaskId::new("B")).await.unwrap();
    gate.add_permits(1);
    wait_idle(&qm).await;

    let finished = qm.snapshot().await.unwrap().finished;
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].id().as_str(), "A");
    assert_eq!(finished[0].status, FinishedStatus::Done);
    assert_eq!(executor.call_ids(), ["A"]);
}

#[tokio::test]
async fn test_clear_history() {
    let qm = manager(Arc::new(ScriptedExecutor::new()));

    // nothing to clear yet
    qm.clear_history().await.unwrap();

    qm.enqueue(task("A")).await.unwrap();
    wait_idle(&qm).await;
    assert_eq!(qm.snapshot().await.unwrap().finished.len(), 1);

    qm.clear_history().await.unwrap();
    let snapshot = qm.snapshot().await.unwrap();
    assert!(snapshot.finished.is_empty());
    assert_eq!(qm.run_state(), RunState::Idle);
}

#[tokio::test]
async fn test_clear_history_leaves_pending_tasks() {
    let (executor, gate) = ScriptedExecutor::gated();
    let executor = Arc::new(executor);
    let qm = manager(executor.clone());

    qm.archive(FinishedRecord {
        element: task("old"),
        status: FinishedStatus::Done,
        started_at: chrono::Utc::now(),
        finished_at: chrono::Utc::now(),
        error: None,
    })
    .await
    .unwrap();
    qm.enqueue(task("A")).await.unwrap();
    qm.enqueue(task("B")).await.unwrap();
    executor.wait_for_calls(1).await;

    qm.clear_history().await.unwrap();

    let snapshot = qm.snapshot().await.unwrap();
    assert!(snapshot.finished.is_empty());
    assert_eq!(queue_ids(&snapshot.queue), ["A", "B"]);
    assert_eq!(qm.run_state(), RunState::Running);

    gate.add_permits(2);
    wait_idle(&qm).await;
}

#[tokio::test]
async fn test_metadata_snapshot_is_attached() {
    let executor = Arc::new(ScriptedExecutor::new());
    let qm = manager_with(
        Arc::new(MemoryStore::new()),
        executor,
        Arc::new(FixedMetadata(json!({ "title": "Quail Hunt" }))),
        Arc::new(LogNotifier),
    );

    qm.enqueue(task("Quail")).await.unwrap();
    wait_idle(&qm).await;

    let finished = qm.snapshot().await.unwrap().finished;
    assert_eq!(
        finished[0].element.params.metadata,
        Some(json!({ "title": "Quail Hunt" }))
    );
}

#[tokio::test]
async fn test_notifier_sees_every_queue_change() {
    let executor = Arc::new(ScriptedExecutor::new());
    let (qm, mut events) = observed_manager(executor);

    qm.enqueue(task("A")).await.unwrap();
    wait_idle(&qm).await;

    let mut changes = Vec::new();
    let mut finished = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            QueueEvent::QueueChanged { elements, .. } => changes.push(queue_ids(&elements)),
            QueueEvent::TaskFinished { task_id, status, .. } => finished.push((task_id, status)),
        }
    }

    assert_eq!(changes, vec![vec!["A".to_string()], Vec::<String>::new()]);
    assert_eq!(finished, vec![(TaskId::new("A"), FinishedStatus::Done)]);
}
