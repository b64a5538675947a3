//! rewind-stores - Document store backends for rewind.
//!
//! # Supported Backends
//!
//! - **Memory** (always available) - [`rewind_core::store::MemoryStore`]
//! - **SQLite** (feature: `sqlite`, default) - single-file embedded store
//!
//! Use [`create_store`] to build the backend named by a
//! [`rewind_core::StorageConfig`].

mod factory;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use factory::{create_store, StoreFactory};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
