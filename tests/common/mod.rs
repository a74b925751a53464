//! Test doubles shared by the integration tests
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use installq::database::{MemoryStore, QueueStore};
use installq::executor::{ExecutionOutcome, TaskExecutor};
use installq::metadata::{MetadataSource, NoMetadata};
use installq::queue::{
    ChannelNotifier, FinishedStatus, LogNotifier, Notifier, QueueElement, QueueEvent, QueueManager,
    TaskId, TaskKind, TaskParams,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

/// What the scripted executor does for one call
#[derive(Debug, Clone)]
pub enum Behavior {
    Report(Option<FinishedStatus>),
    Fail(String),
    Panic,
}

/// Executor that records calls and follows a per-id script.
///
/// With a gate, every call waits for a permit before finishing, which lets a
/// test hold the first task "running" while it inspects the queue.
pub struct ScriptedExecutor {
    calls: Mutex<Vec<QueueCall>>,
    script: Mutex<HashMap<String, VecDeque<Behavior>>>,
    gate: Option<Arc<Semaphore>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    running: Mutex<HashMap<TaskId, CancellationToken>>,
}

#[derive(Debug, Clone)]
pub struct QueueCall {
    pub kind: TaskKind,
    pub params: TaskParams,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(HashMap::new()),
            gate: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let executor = Self {
            gate: Some(gate.clone()),
            ..Self::new()
        };
        (executor, gate)
    }

    pub fn script(self, id: &str, behavior: Behavior) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push_back(behavior);
        self
    }

    pub fn call_ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.params.id.as_str().to_string())
            .collect()
    }

    pub fn calls(&self) -> Vec<QueueCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Poll until at least `n` calls have started
    pub async fn wait_for_calls(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.calls.lock().unwrap().len() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("executor was not called in time");
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    fn id(&self) -> &'static str {
        "scripted"
    }

    async fn execute(&self, kind: TaskKind, params: &TaskParams) -> Result<ExecutionOutcome> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let token = CancellationToken::new();
        self.running
            .lock()
            .unwrap()
            .insert(params.id.clone(), token.clone());
        self.calls.lock().unwrap().push(QueueCall {
            kind,
            params: params.clone(),
        });

        let cancelled = match &self.gate {
            Some(gate) => tokio::select! {
                biased;
                _ = token.cancelled() => true,
                permit = gate.acquire() => {
                    permit.expect("gate closed").forget();
                    false
                }
            },
            None => token.is_cancelled(),
        };
        self.running.lock().unwrap().remove(&params.id);
        if cancelled {
            return Ok(ExecutionOutcome::abort());
        }

        let behavior = self
            .script
            .lock()
            .unwrap()
            .get_mut(params.id.as_str())
            .and_then(VecDeque::pop_front)
            .unwrap_or(Behavior::Report(Some(FinishedStatus::Done)));

        match behavior {
            Behavior::Report(status) => Ok(ExecutionOutcome {
                status,
                message: None,
            }),
            Behavior::Fail(message) => Err(anyhow::anyhow!(message)),
            Behavior::Panic => panic!("installer blew up"),
        }
    }

    async fn cancel(&self, id: &TaskId) -> bool {
        match self.running.lock().unwrap().get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Metadata source returning a fixed entry for every id
pub struct FixedMetadata(pub Value);

#[async_trait]
impl MetadataSource for FixedMetadata {
    async fn lookup(&self, _id: &TaskId, _runner: &str) -> Result<Option<Value>> {
        Ok(Some(self.0.clone()))
    }
}

pub fn task(id: &str) -> QueueElement {
    QueueElement::new(TaskKind::Install, TaskParams::new(id, "legendary"))
}

pub fn task_with(id: &str, key: &str, value: Value) -> QueueElement {
    let mut element = task(id);
    element.params.extra.insert(key.to_string(), value);
    element
}

pub fn manager(executor: Arc<ScriptedExecutor>) -> QueueManager {
    manager_with(
        Arc::new(MemoryStore::new()),
        executor,
        Arc::new(NoMetadata),
        Arc::new(LogNotifier),
    )
}

pub fn manager_with(
    store: Arc<dyn QueueStore>,
    executor: Arc<ScriptedExecutor>,
    metadata: Arc<dyn MetadataSource>,
    notifier: Arc<dyn Notifier>,
) -> QueueManager {
    QueueManager::new(store, executor, metadata, notifier)
}

/// Manager whose notifications can be inspected
pub fn observed_manager(
    executor: Arc<ScriptedExecutor>,
) -> (QueueManager, mpsc::Receiver<QueueEvent>) {
    let (notifier, events) = ChannelNotifier::channel(1024);
    let manager = manager_with(
        Arc::new(MemoryStore::new()),
        executor,
        Arc::new(NoMetadata),
        Arc::new(notifier),
    );
    (manager, events)
}

pub async fn wait_idle(manager: &QueueManager) {
    tokio::time::timeout(Duration::from_secs(10), manager.wait_idle())
        .await
        .expect("queue did not go idle");
}

pub fn queue_ids(elements: &[QueueElement]) -> Vec<String> {
    elements
        .iter()
        .map(|e| e.id().as_str().to_string())
        .collect()
}
