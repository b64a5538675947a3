//! rewind-core - Core library for rewind.
//!
//! This crate provides document change history (audit trail, point-in-time
//! queries, reversion) and a versioned migration runner on top of a small
//! [`DocumentStore`] interface.
//!
//! # Example
//!
//! ```ignore
//! use rewind_core::{MemoryStore, TrackedCollection, Patch};
//!
//! let store = Arc::new(MemoryStore::new());
//! let users = TrackedCollection::with_defaults(store, "users");
//! users.history().ensure_indexes().await?;
//!
//! let user = users.create(doc, Some("alice")).await?;
//! users.update(&id, &Patch::set("name", "B"), Some("bob")).await?;
//!
//! let v1 = users.history().get_version(&id, 1).await?;
//! users.history().revert_to_version(&id, 1, Some("carol")).await?;
//! ```

pub mod config;
pub mod error;
pub mod history;
pub mod migration;
pub mod store;
pub mod traits;
pub mod tracked;
pub mod types;

// Re-export commonly used types
pub use config::{HistoryConfig, MigrationConfig, RewindConfig, StorageConfig, StorageProvider};
pub use error::{ErrorCode, RewindError, RewindResult};
pub use history::{
    ChangeSet, FieldChange, HistoryEntry, HistoryLog, HistoryOperation, HistoryQueryOptions,
    HistorySummary,
};
pub use migration::{
    ApplyOptions, ApplyOutcome, FieldHelper, MigrationContext, MigrationDefinition,
    MigrationRunner, MigrationStatus, RollbackOutcome,
};
pub use store::MemoryStore;
pub use traits::DocumentStore;
pub use tracked::TrackedCollection;
pub use types::{Document, Filter, Patch, SortKey, UpdateOptions};
