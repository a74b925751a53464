use super::models::{FinishedRecord, FinishedStatus, QueueElement, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Events that describe changes in the download queue state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// The pending queue was modified; carries the full new queue
    QueueChanged {
        elements: Vec<QueueElement>,
        timestamp: DateTime<Utc>,
    },
    /// A task reached a terminal state and was archived
    TaskFinished {
        task_id: TaskId,
        status: FinishedStatus,
        timestamp: DateTime<Utc>,
    },
}

/// Observer of queue changes.
///
/// Delivery is best effort: implementations must not block and must swallow
/// their own failures, since a slow or gone observer never fails a queue
/// operation.
pub trait Notifier: Send + Sync {
    fn publish(&self, queue: &[QueueElement]);

    fn finished(&self, record: &FinishedRecord) {
        let _ = record;
    }
}

/// Forwards events to an mpsc receiver (a UI, the backend actor, a test)
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<QueueEvent>,
}

impl ChannelNotifier {
    pub fn new(sender: mpsc::Sender<QueueEvent>) -> Self {
        Self { sender }
    }

    /// Create a notifier together with the receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<QueueEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::new(sender), receiver)
    }

    fn send(&self, event: QueueEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("Queue observer is lagging, dropped an event"),
            Err(TrySendError::Closed(_)) => debug!("Queue observer is gone"),
        }
    }
}

impl Notifier for ChannelNotifier {
    fn publish(&self, queue: &[QueueElement]) {
        self.send(QueueEvent::QueueChanged {
            elements: queue.to_vec(),
            timestamp: Utc::now(),
        });
    }

    fn finished(&self, record: &FinishedRecord) {
        self.send(QueueEvent::TaskFinished {
            task_id: record.id().clone(),
            status: record.status,
            timestamp: record.finished_at,
        });
    }
}

/// Writes queue changes to the log only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn publish(&self, queue: &[QueueElement]) {
        let ids: Vec<&str> = queue.iter().map(|e| e.id().as_str()).collect();
        info!("Queue changed: {:?}", ids);
    }

    fn finished(&self, record: &FinishedRecord) {
        info!("{} finished with status {}", record.id(), record.status);
    }
}
