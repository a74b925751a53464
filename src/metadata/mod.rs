//! Title metadata lookup
//!
//! When a task finishes, the queue attaches a snapshot of the title's library
//! entry to the archived record so the history stays readable after the title
//! is removed from the library.

pub mod library;

use crate::queue::models::TaskId;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub use library::LibraryMetadata;

#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Look up the library entry for `id` on `runner`
    async fn lookup(&self, id: &TaskId, runner: &str) -> Result<Option<Value>>;
}

/// Source used when no library is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

#[async_trait]
impl MetadataSource for NoMetadata {
    async fn lookup(&self, _id: &TaskId, _runner: &str) -> Result<Option<Value>> {
        Ok(None)
    }
}
