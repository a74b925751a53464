//! Wiring of settings into the queue's collaborators

use crate::database::{JsonFileStore, MemoryStore, QueueStore, SqliteStore};
use crate::executor::{CommandExecutor, ExecutionOutcome, TaskExecutor};
use crate::metadata::{LibraryMetadata, MetadataSource, NoMetadata};
use crate::queue::{Notifier, QueueManager, TaskKind, TaskParams};
use crate::utils::config::{QueueSettings, StoreBackend};
use crate::utils::error::InstallqError;
use crate::utils::paths;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Open the store selected in `settings`
pub async fn open_store(settings: &QueueSettings) -> Result<Arc<dyn QueueStore>> {
    info!(
        "Using {} store in {:?}",
        settings.store.as_str(),
        settings.data_dir
    );
    let store: Arc<dyn QueueStore> = match settings.store {
        StoreBackend::Sqlite => {
            Arc::new(SqliteStore::open(&paths::get_database_path(&settings.data_dir)).await?)
        }
        StoreBackend::Json => {
            Arc::new(JsonFileStore::open(&paths::get_store_file_path(&settings.data_dir)).await?)
        }
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}

/// Build the executor for the configured installer.
///
/// Without an installer the returned executor fails every task; callers that
/// are about to run tasks should check [`QueueSettings::installer`] first.
pub fn build_executor(settings: &QueueSettings) -> Result<Arc<dyn TaskExecutor>> {
    match &settings.installer {
        Some(program) => Ok(Arc::new(CommandExecutor::locate(
            program,
            settings.installer_args.clone(),
        )?)),
        None => Ok(Arc::new(NotConfigured)),
    }
}

pub fn build_metadata(settings: &QueueSettings) -> Arc<dyn MetadataSource> {
    match &settings.library_file {
        Some(path) => Arc::new(LibraryMetadata::new(path)),
        None => Arc::new(NoMetadata),
    }
}

/// Build a queue manager from settings, publishing to `notifier`
pub async fn build_manager(
    settings: &QueueSettings,
    notifier: Arc<dyn Notifier>,
) -> Result<QueueManager> {
    let store = open_store(settings).await?;
    let executor = build_executor(settings)?;
    let metadata = build_metadata(settings);
    Ok(QueueManager::new(store, executor, metadata, notifier))
}

struct NotConfigured;

#[async_trait]
impl TaskExecutor for NotConfigured {
    fn id(&self) -> &'static str {
        "not-configured"
    }

    async fn execute(&self, _kind: TaskKind, _params: &TaskParams) -> Result<ExecutionOutcome> {
        Err(InstallqError::InstallerNotFound("no installer configured".to_string()).into())
    }
}
