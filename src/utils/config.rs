//! Application configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::paths;

/// Queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Directory holding the store and the settings file
    pub data_dir: PathBuf,

    /// Which store backend persists the queue
    pub store: StoreBackend,

    /// Installer program driven for every task
    pub installer: Option<String>,

    /// Extra arguments passed before the task arguments
    pub installer_args: Vec<String>,

    /// Optional library file used to enrich finished records
    pub library_file: Option<PathBuf>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            data_dir: paths::get_data_dir(),
            store: StoreBackend::Sqlite,
            installer: None,
            installer_args: Vec::new(),
            library_file: None,
        }
    }
}

/// Store backend options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Json,
    Memory,
}

impl StoreBackend {
    /// Get string representation for display
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Sqlite => "sqlite",
            StoreBackend::Json => "json",
            StoreBackend::Memory => "memory",
        }
    }
}

impl QueueSettings {
    /// Load settings from `settings.json` in `data_dir`, falling back to defaults
    /// when the file does not exist.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = paths::get_settings_path(data_dir);
        if !path.exists() {
            debug!("No settings file at {:?}, using defaults", path);
            return Ok(Self {
                data_dir: data_dir.to_path_buf(),
                ..Self::default()
            });
        }

        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file {:?}", path))?;
        let mut settings: QueueSettings =
            serde_json::from_str(&json).context("Failed to parse settings file")?;
        // the settings file never relocates the directory it was found in
        settings.data_dir = data_dir.to_path_buf();

        info!("Loaded settings from {:?}", path);
        Ok(settings)
    }
}
