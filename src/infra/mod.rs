//! Backends, the filesystem collaborator and process-level plumbing.

pub mod db;
pub mod error;
pub mod fs;
pub mod kv;
mod lock;
pub mod memory;
pub mod telemetry;

use std::sync::Arc;

use tracing::info;

use crate::application::observer::CacheObserver;
use crate::application::repos::Store;
use crate::config::{StoreBackend, StoreSettings};

use self::{db::SqliteStore, error::InfraError, kv::RedbStore, memory::MemoryStore};

/// Build and initialize the configured backend.
pub async fn open_store(
    settings: &StoreSettings,
    observer: Arc<dyn CacheObserver>,
) -> Result<Arc<dyn Store>, InfraError> {
    let store: Arc<dyn Store> = match settings.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new(observer)),
        StoreBackend::Embedded => Arc::new(RedbStore::new(&settings.data_dir, observer)),
        StoreBackend::Sqlite => {
            if let Some(dir) = sqlite_parent_dir(&settings.database_url) {
                std::fs::create_dir_all(&dir).map_err(|err| InfraError::io(dir, err))?;
            }
            let pool =
                SqliteStore::connect(&settings.database_url, settings.max_connections.get())
                    .await?;
            Arc::new(SqliteStore::new(pool, observer))
        }
    };

    store
        .init()
        .await
        .map_err(|err| InfraError::store_open(settings.backend.as_str(), err))?;
    info!(
        target: "postindex::store",
        backend = %settings.backend,
        "store ready"
    );
    Ok(store)
}

/// Directory holding a file-backed SQLite database, if the URL names one.
fn sqlite_parent_dir(url: &str) -> Option<std::path::PathBuf> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.contains(":memory:") {
        return None;
    }
    std::path::Path::new(path)
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(std::path::Path::to_path_buf)
}
