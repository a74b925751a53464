//! Error handling for installq

use thiserror::Error;

/// Main error type for installq
#[derive(Debug, Error)]
pub enum InstallqError {
    #[error("Stored collection `{collection}` is corrupt: {source}")]
    StoreCorrupt {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Installer not found: {0}")]
    InstallerNotFound(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
