//! Data directory resolution
//!
//! Everything installq persists (the queue store, the settings file) lives in one
//! per-user data directory. The location follows platform conventions through
//! `dirs`, so it is the same whether the binary is started from a shell, a
//! desktop launcher or a service manager whose working directory is `/`.
//!
//! - Linux: `$XDG_DATA_HOME/installq/` (usually `~/.local/share/installq/`)
//! - macOS: `~/Library/Application Support/installq/`
//! - Windows: `%APPDATA%\installq\`

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const APP_DIR_NAME: &str = "installq";

/// Get the data directory for installq, creating it if needed.
pub fn get_data_dir() -> PathBuf {
    let dir = dirs::data_dir()
        .map(|base| base.join(APP_DIR_NAME))
        .or_else(|| dirs::home_dir().map(|home| home.join(format!(".{}", APP_DIR_NAME))))
        .unwrap_or_else(|| {
            warn!("Could not determine a data directory, using the temp dir");
            std::env::temp_dir().join(APP_DIR_NAME)
        });

    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("Failed to create data directory {:?}: {}", dir, e);
    }

    debug!("Data directory: {:?}", dir);
    dir
}

/// SQLite database holding the `queue` and `finished` collections.
pub fn get_database_path(data_dir: &Path) -> PathBuf {
    data_dir.join("download-manager.db")
}

/// JSON store file, same layout as the desktop app's `download-manager.json`.
pub fn get_store_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join("download-manager.json")
}

/// Optional settings file read at startup.
pub fn get_settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}
