pub mod events;
pub mod manager;
pub mod models;
pub mod slots;

pub use events::{ChannelNotifier, LogNotifier, Notifier, QueueEvent};
pub use manager::QueueManager;
pub use models::{
    FinishedRecord, FinishedStatus, QueueElement, QueueSnapshot, RunState, TaskId, TaskKind,
    TaskParams,
};
