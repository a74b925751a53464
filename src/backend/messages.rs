use crate::queue::{QueueElement, QueueEvent, QueueSnapshot, TaskId, TaskKind, TaskParams};
use serde::{Deserialize, Serialize};

/// A task as sent by a front end; the queue stamps `added_at` itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub kind: TaskKind,
    pub params: TaskParams,
}

impl TaskRequest {
    pub fn into_element(self) -> QueueElement {
        QueueElement::new(self.kind, self.params)
    }
}

/// Commands sent from a front end to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum BackendCommand {
    Enqueue {
        #[serde(default)]
        task: Option<TaskRequest>,
    },
    Remove {
        id: TaskId,
    },
    Cancel {
        id: TaskId,
    },
    ClearHistory,
    Snapshot,
    // System
    Shutdown,
}

/// Events sent from the backend to a front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendEvent {
    /// Forwarded from the queue's notifier
    Queue(QueueEvent),

    /// Reply to `BackendCommand::Snapshot`
    Snapshot(QueueSnapshot),

    // System
    Error { message: String },
}
