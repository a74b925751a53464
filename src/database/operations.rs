//! SQLite-backed collection store

use super::schema::initialize_database;
use super::{Collection, QueueStore};
use crate::utils::error::InstallqError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use tracing::debug;

/// Stores each collection as one row of the `collections` table
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create new store over an initialized pool
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database file at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        let url = format!("sqlite://{}", path.display());
        let pool = initialize_database(&url)
            .await
            .with_context(|| format!("Failed to open queue database {:?}", path))?;
        Ok(Self::new(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl QueueStore for SqliteStore {
    async fn get_raw(&self, collection: Collection) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM collections WHERE name = ?")
            .bind(collection.name())
            .fetch_optional(&self.pool)
            .await
            .map_err(InstallqError::from)?;

        Ok(row.map(|r| r.get("value")))
    }

    async fn set_raw(&self, collection: Collection, document: String) -> Result<()> {
        // one statement, so the old row is replaced atomically
        sqlx::query("INSERT OR REPLACE INTO collections (name, value, updated_at) VALUES (?, ?, ?)")
            .bind(collection.name())
            .bind(&document)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(InstallqError::from)?;

        debug!("Saved collection: {} ({} bytes)", collection, document.len());
        Ok(())
    }

    async fn delete(&self, collection: Collection) -> Result<()> {
        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(collection.name())
            .execute(&self.pool)
            .await
            .map_err(InstallqError::from)?;

        debug!("Deleted collection: {}", collection);
        Ok(())
    }

    async fn has(&self, collection: Collection) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM collections WHERE name = ?")
            .bind(collection.name())
            .fetch_optional(&self.pool)
            .await
            .map_err(InstallqError::from)?;

        Ok(row.is_some())
    }
}
