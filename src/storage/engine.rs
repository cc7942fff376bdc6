//! StorageEngine - process-wide backend owner
//!
//! TigerStyle: built once at startup, hands out request-scoped handles.
//!
//! File sessions share one in-memory map, so a write by one request is seen
//! by the next. Db sessions share the pool and each own a transaction.

use std::sync::Arc;

use super::backend::Storage;
use super::db::DbStorage;
use super::error::StorageResult;
use super::file::FileStorage;
use super::StorageKind;
use crate::config::StorageConfig;

/// The backend selected for this process.
pub enum StorageEngine {
    /// JSON file backend
    File(FileStorage),
    /// Relational backend
    Db(DbStorage),
}

impl StorageEngine {
    /// Build the configured backend and load or create its durable state.
    ///
    /// # Errors
    /// Returns error if the file cannot be decoded or the database cannot be
    /// reached.
    pub async fn open(config: &StorageConfig) -> StorageResult<Self> {
        let engine = match config.kind {
            StorageKind::File => Self::File(FileStorage::new(config.file_path())),
            StorageKind::Db => {
                Self::Db(DbStorage::connect(&config.db_url, config.db_max_connections).await?)
            }
        };

        match &engine {
            Self::File(storage) => storage.reload().await?,
            Self::Db(storage) => storage.reload().await?,
        }
        tracing::info!(kind = %engine.kind(), "Storage engine ready");
        Ok(engine)
    }

    /// Which backend this is.
    #[must_use]
    pub fn kind(&self) -> StorageKind {
        match self {
            Self::File(_) => StorageKind::File,
            Self::Db(_) => StorageKind::Db,
        }
    }

    /// A handle scoped to one unit of work. Close it when done.
    #[must_use]
    pub fn session(&self) -> Arc<dyn Storage> {
        match self {
            Self::File(storage) => Arc::new(storage.clone()),
            Self::Db(storage) => Arc::new(storage.session()),
        }
    }

    /// Release backend resources at process exit.
    pub async fn shutdown(&self) {
        match self {
            Self::File(storage) => {
                if let Err(e) = storage.close().await {
                    tracing::warn!(error = %e, "file storage close failed");
                }
            }
            Self::Db(storage) => storage.shutdown().await,
        }
        tracing::info!(kind = %self.kind(), "Storage engine shut down");
    }
}
