//! Library file lookup
//!
//! Reads a JSON library export: either a bare array of entries or an object
//! with a `games` array. Entries are matched on `app_name`; when an entry has a
//! `runner` field it must match too.

use super::MetadataSource;
use crate::queue::models::TaskId;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LibraryMetadata {
    path: PathBuf,
}

impl LibraryMetadata {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read the whole library. Re-read on every lookup so edits made by other
    /// tools between tasks are picked up.
    async fn load_entries(&self) -> Result<Vec<Value>> {
        if !self.path.exists() {
            debug!("Library file {:?} not found", self.path);
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&self.path)
            .await
            .context("Failed to read library file")?;
        let library: Value =
            serde_json::from_str(&json).context("Failed to deserialize library file")?;

        Ok(match library {
            Value::Array(entries) => entries,
            Value::Object(mut map) => match map.remove("games") {
                Some(Value::Array(entries)) => entries,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        })
    }
}

fn matches(entry: &Value, id: &TaskId, runner: &str) -> bool {
    let name_matches = entry.get("app_name").and_then(Value::as_str) == Some(id.as_str());
    let runner_matches = match entry.get("runner").and_then(Value::as_str) {
        Some(entry_runner) => entry_runner == runner,
        None => true,
    };
    name_matches && runner_matches
}

#[async_trait]
impl MetadataSource for LibraryMetadata {
    async fn lookup(&self, id: &TaskId, runner: &str) -> Result<Option<Value>> {
        let entries = self.load_entries().await?;
        Ok(entries.into_iter().find(|entry| matches(entry, id, runner)))
    }
}
