//! Sequential download/install queue manager
//!
//! Tasks run strictly one at a time in queue order. The pending queue and the
//! finished history live in a [`QueueStore`] so they survive restarts; the run
//! state is in-memory only.
//!
//! All store read-modify-write and every run-state transition happen while
//! holding `Inner::state`. In particular the loop only declares itself idle
//! under that lock after seeing an empty queue, and `enqueue` only spawns a loop
//! under that lock after seeing idle, so there is never more than one loop and
//! an enqueued task is never left behind by a loop that is shutting down.

use super::events::Notifier;
use super::models::{
    FinishedRecord, FinishedStatus, QueueElement, QueueSnapshot, RunState, TaskId,
};
use super::slots::{self, Upsert};
use crate::database::{self, Collection, QueueStore};
use crate::executor::TaskExecutor;
use crate::metadata::MetadataSource;
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Download queue manager
#[derive(Clone)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn QueueStore>,
    executor: Arc<dyn TaskExecutor>,
    metadata: Arc<dyn MetadataSource>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<LoopState>,
    run_state: watch::Sender<RunState>,
}

/// Guarded alongside the store; holding the guard is the critical section
#[derive(Debug, Default)]
struct LoopState {
    current: Option<TaskId>,
}

impl QueueManager {
    /// Create new queue manager. No processing starts until a task is enqueued
    /// or [`resume`](Self::resume) is called.
    pub fn new(
        store: Arc<dyn QueueStore>,
        executor: Arc<dyn TaskExecutor>,
        metadata: Arc<dyn MetadataSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (run_state, _) = watch::channel(RunState::Idle);
        Self {
            inner: Arc::new(Inner {
                store,
                executor,
                metadata,
                notifier,
                state: Mutex::new(LoopState::default()),
                run_state,
            }),
        }
    }

    /// Add a task, or replace the pending task with the same id in place.
    ///
    /// Starts the run loop if none is active. A task without an id is logged
    /// and ignored.
    pub async fn enqueue(&self, element: QueueElement) -> Result<()> {
        if element.id().is_empty() {
            error!("Can not add a task without an id to the queue");
            return Ok(());
        }

        let state = self.inner.state.lock().await;
        let mut elements: Vec<QueueElement> = self.read(Collection::Queue).await?;

        let id = element.id().clone();
        let kind = element.kind;
        let landed = slots::upsert(&mut elements, element);
        database::set(self.store(), Collection::Queue, &elements).await?;

        match landed {
            Upsert::Appended(i) => info!("{} ({}) added to download queue at position {}", id, kind, i),
            Upsert::Replaced(i) => info!("{} ({}) updated in download queue at position {}", id, kind, i),
        }

        self.inner.notifier.publish(&elements);
        self.start_if_idle(&state);
        Ok(())
    }

    /// Remove a pending task. Does nothing when the id is empty or the queue
    /// was never written; otherwise observers are notified even when no task
    /// with that id was queued.
    pub async fn dequeue_by_id(&self, id: &TaskId) -> Result<()> {
        if id.is_empty() {
            error!("Can not remove a task without an id from the queue");
            return Ok(());
        }

        let state = self.inner.state.lock().await;
        self.remove_locked(id, &state).await
    }

    /// Stop a task: signal the executor if it is the one running, then drop it
    /// from the queue. The run loop archives whatever status the executor
    /// reports once it returns.
    pub async fn cancel(&self, id: &TaskId) -> Result<()> {
        if id.is_empty() {
            error!("Can not cancel a task without an id");
            return Ok(());
        }

        let running = self.current_task().await.as_ref() == Some(id);
        if running {
            if self.inner.executor.cancel(id).await {
                info!("Asked {} executor to abort {}", self.inner.executor.id(), id);
            } else {
                warn!("Executor {} could not abort {}", self.inner.executor.id(), id);
            }
        }

        self.dequeue_by_id(id).await
    }

    /// Store a finished record, overwriting any earlier record for the same id.
    pub async fn archive(&self, record: FinishedRecord) -> Result<()> {
        let state = self.inner.state.lock().await;
        self.archive_locked(&record, &state).await
    }

    /// Forget every finished record. Pending tasks are untouched.
    pub async fn clear_history(&self) -> Result<()> {
        let _state = self.inner.state.lock().await;
        if self.store().has(Collection::Finished).await? {
            self.store().delete(Collection::Finished).await?;
            info!("Cleared finished downloads");
        }
        Ok(())
    }

    /// Current queue and finished history as stored
    pub async fn snapshot(&self) -> Result<QueueSnapshot> {
        let _state = self.inner.state.lock().await;
        Ok(QueueSnapshot {
            queue: self.read(Collection::Queue).await?,
            finished: self.read(Collection::Finished).await?,
        })
    }

    /// Start draining a queue persisted by an earlier process.
    ///
    /// Returns whether a run loop was started. A task that was executing when
    /// the previous process died is still at the head and runs again.
    pub async fn resume(&self) -> Result<bool> {
        let state = self.inner.state.lock().await;
        let elements: Vec<QueueElement> = self.read(Collection::Queue).await?;
        if elements.is_empty() {
            debug!("Nothing to resume");
            return Ok(false);
        }

        info!("Resuming download queue with {} task(s)", elements.len());
        Ok(self.start_if_idle(&state))
    }

    pub fn run_state(&self) -> RunState {
        *self.inner.run_state.borrow()
    }

    /// Watch run-state transitions
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.inner.run_state.subscribe()
    }

    /// Wait until no run loop is active
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        // the sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|state| *state == RunState::Idle).await;
    }

    /// Id of the task whose executor call is in flight
    pub async fn current_task(&self) -> Option<TaskId> {
        self.inner.state.lock().await.current.clone()
    }

    fn store(&self) -> &dyn QueueStore {
        &*self.inner.store
    }

    async fn read<T: serde::de::DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>> {
        database::get(self.store(), collection).await
    }

    /// Flip idle -> running and spawn the loop. Must be called with the state
    /// lock held.
    fn start_if_idle(&self, _held: &MutexGuard<'_, LoopState>) -> bool {
        if *self.inner.run_state.borrow() == RunState::Running {
            debug!("Queue already running");
            return false;
        }

        self.inner.run_state.send_replace(RunState::Running);
        let manager = self.clone();
        tokio::spawn(async move { manager.run_loop().await });
        true
    }

    async fn remove_locked(&self, id: &TaskId, _held: &MutexGuard<'_, LoopState>) -> Result<()> {
        if !self.store().has(Collection::Queue).await? {
            return Ok(());
        }

        let mut elements: Vec<QueueElement> = self.read(Collection::Queue).await?;
        if slots::remove(&mut elements, id).is_some() {
            database::set(self.store(), Collection::Queue, &elements).await?;
            info!("{} removed from download queue", id);
        } else {
            debug!("{} was not in the download queue", id);
        }

        self.inner.notifier.publish(&elements);
        Ok(())
    }

    async fn archive_locked(
        &self,
        record: &FinishedRecord,
        _held: &MutexGuard<'_, LoopState>,
    ) -> Result<()> {
        let mut finished: Vec<FinishedRecord> = self.read(Collection::Finished).await?;
        slots::upsert(&mut finished, record.clone());
        database::set(self.store(), Collection::Finished, &finished).await?;

        info!("{} added to finished downloads ({})", record.id(), record.status);
        self.inner.notifier.finished(record);
        Ok(())
    }

    async fn run_loop(self) {
        let span = info_span!("run_loop", run_id = %Uuid::new_v4());
        async move {
            info!("Queue processing started");
            loop {
                match self.process_next().await {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(e) => {
                        error!("Queue processing stopped: {:#}", e);
                        let mut state = self.inner.state.lock().await;
                        state.current = None;
                        self.inner.run_state.send_replace(RunState::Idle);
                        break;
                    }
                }
            }
            info!("Queue processing finished");
        }
        .instrument(span)
        .await
    }

    /// Run the head task to completion. Returns `false` once the queue is empty
    /// and the loop has gone idle.
    async fn process_next(&self) -> Result<bool> {
        let mut element = {
            let mut state = self.inner.state.lock().await;
            let elements: Vec<QueueElement> = self.read(Collection::Queue).await?;
            match elements.into_iter().next() {
                Some(head) => {
                    state.current = Some(head.id().clone());
                    self.inner.run_state.send_replace(RunState::Running);
                    head
                }
                None => {
                    state.current = None;
                    self.inner.run_state.send_replace(RunState::Idle);
                    return Ok(false);
                }
            }
        };

        let started_at = Utc::now();
        info!("Starting {} of {}", element.kind, element.id());
        let (status, error) = self.execute(&element).await;

        if let Some(metadata) = self.lookup_metadata(&element).await {
            element.params.metadata = Some(metadata);
        }
        let record = FinishedRecord {
            element,
            status,
            started_at,
            finished_at: Utc::now(),
            error,
        };

        let mut state = self.inner.state.lock().await;
        self.archive_locked(&record, &state).await?;
        state.current = None;
        self.remove_locked(record.id(), &state).await?;
        Ok(true)
    }

    /// Await the executor. Errors and panics become an `error` record; they
    /// never stop the loop.
    async fn execute(&self, element: &QueueElement) -> (FinishedStatus, Option<String>) {
        let executor = self.inner.executor.clone();
        let kind = element.kind;
        let params = element.params.clone();
        let handle = tokio::spawn(async move { executor.execute(kind, &params).await });

        match handle.await {
            Ok(Ok(outcome)) => {
                let status = match outcome.status {
                    Some(status) => status,
                    None => {
                        warn!("Executor reported no status for {}, recording abort", element.id());
                        FinishedStatus::default()
                    }
                };
                (status, outcome.message)
            }
            Ok(Err(e)) => {
                error!("{} of {} failed: {:#}", kind, element.id(), e);
                (FinishedStatus::Error, Some(format!("{:#}", e)))
            }
            Err(join_error) => {
                error!("Executor for {} did not complete: {}", element.id(), join_error);
                (FinishedStatus::Error, Some(join_error.to_string()))
            }
        }
    }

    async fn lookup_metadata(&self, element: &QueueElement) -> Option<serde_json::Value> {
        match self
            .inner
            .metadata
            .lookup(element.id(), &element.params.runner)
            .await
        {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Metadata lookup for {} failed: {:#}", element.id(), e);
                None
            }
        }
    }
}
