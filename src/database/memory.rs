//! In-process store, used for ephemeral runs and tests

use super::{Collection, QueueStore};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<Collection, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn get_raw(&self, collection: Collection) -> Result<Option<String>> {
        Ok(self.documents.lock().await.get(&collection).cloned())
    }

    async fn set_raw(&self, collection: Collection, document: String) -> Result<()> {
        self.documents.lock().await.insert(collection, document);
        Ok(())
    }

    async fn delete(&self, collection: Collection) -> Result<()> {
        self.documents.lock().await.remove(&collection);
        Ok(())
    }

    async fn has(&self, collection: Collection) -> Result<bool> {
        Ok(self.documents.lock().await.contains_key(&collection))
    }
}
