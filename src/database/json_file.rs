//! Single JSON file store
//!
//! Keeps every collection as a top-level key of one JSON object, the same layout
//! the desktop launcher uses for `download-manager.json`:
//!
//! ```json
//! { "queue": [ ... ], "finished": [ ... ] }
//! ```
//!
//! Writes go to a sibling temp file which is then renamed over the original, so
//! a crash mid-write leaves the previous file intact.

use super::{Collection, QueueStore};
use crate::utils::error::InstallqError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    contents: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open the store file, starting empty if it does not exist yet
    pub async fn open(path: &Path) -> Result<Self> {
        let contents = if path.exists() {
            let json = fs::read_to_string(path)
                .await
                .map_err(InstallqError::from)
                .with_context(|| format!("Failed to read store file {:?}", path))?;
            match serde_json::from_str::<Value>(&json).map_err(InstallqError::from)? {
                Value::Object(map) => map,
                _ => anyhow::bail!("Store file {:?} is not a JSON object", path),
            }
        } else {
            info!("Creating new store file at {:?}", path);
            Map::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            contents: Mutex::new(contents),
        })
    }

    async fn persist(&self, contents: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(InstallqError::from)?;
        }

        let json = serde_json::to_string_pretty(contents).map_err(InstallqError::from)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(InstallqError::from)
            .context("Failed to create temp store file")?;
        file.write_all(json.as_bytes())
            .await
            .map_err(InstallqError::from)?;
        file.sync_all().await.map_err(InstallqError::from)?;
        drop(file);

        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(InstallqError::from)
            .context("Failed to replace store file")?;

        debug!("Wrote store file {:?} ({} bytes)", self.path, json.len());
        Ok(())
    }
}

#[async_trait]
impl QueueStore for JsonFileStore {
    async fn get_raw(&self, collection: Collection) -> Result<Option<String>> {
        let contents = self.contents.lock().await;
        Ok(contents.get(collection.name()).map(Value::to_string))
    }

    async fn set_raw(&self, collection: Collection, document: String) -> Result<()> {
        let value: Value = serde_json::from_str(&document).map_err(InstallqError::from)?;

        let mut contents = self.contents.lock().await;
        let mut next = contents.clone();
        next.insert(collection.name().to_string(), value);
        self.persist(&next).await?;
        *contents = next;
        Ok(())
    }

    async fn delete(&self, collection: Collection) -> Result<()> {
        let mut contents = self.contents.lock().await;
        if !contents.contains_key(collection.name()) {
            return Ok(());
        }

        let mut next = contents.clone();
        next.remove(collection.name());
        self.persist(&next).await?;
        *contents = next;
        Ok(())
    }

    async fn has(&self, collection: Collection) -> Result<bool> {
        Ok(self.contents.lock().await.contains_key(collection.name()))
    }
}
