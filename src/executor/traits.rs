use crate::queue::models::{FinishedStatus, TaskId, TaskKind, TaskParams};
use anyhow::Result;
use async_trait::async_trait;

/// What an executor reports once a task has reached a terminal state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// `None` is recorded as `abort`
    pub status: Option<FinishedStatus>,
    pub message: Option<String>,
}

impl ExecutionOutcome {
    pub fn done() -> Self {
        Self {
            status: Some(FinishedStatus::Done),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Some(FinishedStatus::Error),
            message: Some(message.into()),
        }
    }

    pub fn abort() -> Self {
        Self {
            status: Some(FinishedStatus::Abort),
            message: None,
        }
    }
}

/// Core trait for whatever performs the actual download/install
///
/// The queue calls `execute` for one task at a time and waits for it to finish;
/// it must only return once the task is done, failed or aborted.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Returns a unique identifier for this executor (e.g. "command", "mock")
    fn id(&self) -> &'static str;

    /// Runs the task to completion
    ///
    /// An `Err` is recorded as `error` in the finished history.
    async fn execute(&self, kind: TaskKind, params: &TaskParams) -> Result<ExecutionOutcome>;

    /// Asks a running task to stop. Returns whether a running task was signalled.
    ///
    /// Executors without a cancellation mechanism keep the default, in which case
    /// the running task finishes normally.
    async fn cancel(&self, id: &TaskId) -> bool {
        let _ = id;
        false
    }
}
