//! Utility modules for error handling, configuration and paths

pub mod config;
pub mod error;
pub mod paths;

// Re-export for convenience
pub use config::{QueueSettings, StoreBackend};
pub use error::InstallqError;
pub use paths::{get_data_dir, get_database_path, get_settings_path, get_store_file_path};
