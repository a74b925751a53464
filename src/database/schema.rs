//! Database schema

use crate::utils::error::InstallqError;
use anyhow::Result;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::{debug, info};

/// Initialize the database
pub async fn initialize_database(db_url: &str) -> Result<Pool<Sqlite>> {
    // Create database if it doesn't exist
    if !Sqlite::database_exists(db_url)
        .await
        .map_err(InstallqError::from)? {
        debug!("Creating database at: {}", db_url);
        Sqlite::create_database(db_url)
            .await
            .map_err(InstallqError::from)?;
    }

    // A single connection: the queue manager already serializes every access
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(db_url)
        .await
        .map_err(InstallqError::from)?;

    info!("Running database migrations");
    create_tables(&pool).await?;

    Ok(pool)
}

/// Create database tables
async fn create_tables(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(InstallqError::from)?;

    debug!("Database tables created successfully");
    Ok(())
}
