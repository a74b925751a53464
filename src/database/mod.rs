//! Database module
//!
//! The queue persists two collections, `queue` and `finished`, each as a single
//! JSON document. A backend only has to store and replace whole documents;
//! (de)serialization happens in [`get`] and [`set`].

pub mod json_file;
pub mod memory;
pub mod operations;
pub mod schema;

use crate::utils::error::InstallqError;
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

// Re-export for convenience
pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use operations::SqliteStore;
pub use schema::initialize_database;

/// Named collections held by a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Queue,
    Finished,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Queue => "queue",
            Collection::Finished => "finished",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Durable key -> document store.
///
/// `set_raw` must replace the previous document atomically: a reader sees
/// either the old document or the new one. Implementations need not be safe
/// against concurrent read-modify-write; the queue manager serializes access.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Returns the stored document, or `None` if the collection does not exist
    async fn get_raw(&self, collection: Collection) -> Result<Option<String>>;

    async fn set_raw(&self, collection: Collection, document: String) -> Result<()>;

    async fn delete(&self, collection: Collection) -> Result<()>;

    async fn has(&self, collection: Collection) -> Result<bool>;
}

/// Read a collection, defaulting to an empty sequence when it does not exist.
pub async fn get<T: DeserializeOwned>(
    store: &dyn QueueStore,
    collection: Collection,
) -> Result<Vec<T>> {
    match store.get_raw(collection).await? {
        Some(document) => serde_json::from_str(&document).map_err(|source| {
            InstallqError::StoreCorrupt {
                collection: collection.name(),
                source,
            }
            .into()
        }),
        None => Ok(Vec::new()),
    }
}

/// Replace a collection with `items`.
pub async fn set<T: Serialize>(
    store: &dyn QueueStore,
    collection: Collection,
    items: &[T],
) -> Result<()> {
    let document = serde_json::to_string(items).map_err(InstallqError::from)?;
    store.set_raw(collection, document).await
}
