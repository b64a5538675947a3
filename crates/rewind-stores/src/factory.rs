//! Factory for creating document stores from configuration.

use std::sync::Arc;

use tracing::debug;

use rewind_core::config::{StorageConfig, StorageProvider};
use rewind_core::error::{RewindError, RewindResult};
use rewind_core::store::MemoryStore;
use rewind_core::traits::DocumentStore;

/// Factory for creating document store providers.
pub struct StoreFactory;

impl StoreFactory {
    /// Create a document store from the given configuration.
    pub fn create(config: &StorageConfig) -> RewindResult<Arc<dyn DocumentStore>> {
        match config.provider {
            StorageProvider::Memory => {
                debug!("Using in-memory document store");
                Ok(Arc::new(MemoryStore::new()))
            }

            #[cfg(feature = "sqlite")]
            StorageProvider::Sqlite => {
                if let Some(parent) = config.path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                debug!(path = %config.path.display(), "Opening SQLite document store");
                let store = crate::sqlite::SqliteStore::open(&config.path)?;
                Ok(Arc::new(store))
            }

            #[allow(unreachable_patterns)]
            provider => Err(RewindError::Configuration(format!(
                "Storage provider {:?} is not enabled. Enable the corresponding feature.",
                provider
            ))),
        }
    }
}

/// Create a document store from the given configuration.
pub fn create_store(config: &StorageConfig) -> RewindResult<Arc<dyn DocumentStore>> {
    StoreFactory::create(config)
}
