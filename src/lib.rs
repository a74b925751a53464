//! installq library
//!
//! A sequential download/install queue: tasks are persisted, deduplicated by
//! id, executed one at a time by an external installer, and archived into a
//! per-id finished history.

pub mod app;
pub mod backend;
pub mod database;
pub mod executor;
pub mod metadata;
pub mod queue;
pub mod utils;

// Re-export main types for easier use
pub use database::{Collection, QueueStore};
pub use executor::{ExecutionOutcome, TaskExecutor};
pub use metadata::MetadataSource;
pub use queue::{
    FinishedRecord, FinishedStatus, Notifier, QueueElement, QueueManager, QueueSnapshot,
    RunState, TaskId, TaskKind, TaskParams,
};
pub use utils::{InstallqError, QueueSettings};
