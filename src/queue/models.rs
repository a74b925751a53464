//! Data structures for queued and finished tasks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

/// Stable identifier of a task (the application/title id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What the executor has to do for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Install,
    Update,
    Import,
    Repair,
    Move,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Install => "install",
            TaskKind::Update => "update",
            TaskKind::Import => "import",
            TaskKind::Repair => "repair",
            TaskKind::Move => "move",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Parameters handed to the executor.
///
/// Only `id` and `runner` are interpreted by the queue. Anything else a caller
/// sends is kept in `extra` and passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskParams {
    pub id: TaskId,
    pub runner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Library metadata snapshot, filled in when the task is archived
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskParams {
    pub fn new(id: impl Into<TaskId>, runner: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            runner: runner.into(),
            platform: None,
            path: None,
            metadata: None,
            extra: Map::new(),
        }
    }
}

/// A pending task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueElement {
    pub kind: TaskKind,
    pub params: TaskParams,
    pub added_at: DateTime<Utc>,
}

impl QueueElement {
    /// Create a new queue element stamped with the current time
    pub fn new(kind: TaskKind, params: TaskParams) -> Self {
        Self {
            kind,
            params,
            added_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.params.id
    }
}

/// Terminal outcome of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishedStatus {
    Done,
    Error,
    /// Also used when the executor reported no status at all
    #[default]
    Abort,
}

impl FinishedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishedStatus::Done => "done",
            FinishedStatus::Error => "error",
            FinishedStatus::Abort => "abort",
        }
    }
}

impl fmt::Display for FinishedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A task plus its terminal status, as kept in the finished history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedRecord {
    #[serde(flatten)]
    pub element: QueueElement,
    pub status: FinishedStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FinishedRecord {
    pub fn id(&self) -> &TaskId {
        self.element.id()
    }
}

/// Current queue and history, for display
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub queue: Vec<QueueElement>,
    pub finished: Vec<FinishedRecord>,
}

/// Whether a run loop is currently draining the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
}

/// Anything stored in a collection keyed by task id
pub trait Keyed {
    fn key(&self) -> &TaskId;
}

impl Keyed for QueueElement {
    fn key(&self) -> &TaskId {
        self.id()
    }
}

impl Keyed for FinishedRecord {
    fn key(&self) -> &TaskId {
        self.id()
    }
}
