//! Document store trait - the narrow storage interface the engine consumes.

use async_trait::async_trait;

use crate::error::RewindResult;
use crate::types::{
    BulkWriteResult, DeleteResult, Document, Filter, Patch, SortKey, UpdateOptions, UpdateResult,
    WriteOp,
};

/// Core DocumentStore trait - all storage backends implement this.
///
/// Stores own the identity fields: `insert` assigns `_id` when the document
/// has none and starts the `__v` revision counter at 0; every update that
/// modifies a document increments `__v`. Unique index violations must be
/// reported as duplicate-key errors (`RewindError::duplicate_key`) so callers
/// can tell racing writers apart from genuine failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document, returning its id.
    async fn insert(&self, collection: &str, doc: Document) -> RewindResult<String>;

    /// Find the first document matching the filter in sort order.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &[SortKey],
    ) -> RewindResult<Option<Document>>;

    /// Find all documents matching the filter, sorted, optionally limited.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &[SortKey],
        limit: Option<usize>,
    ) -> RewindResult<Vec<Document>>;

    /// Update the first matching document.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
        options: UpdateOptions,
    ) -> RewindResult<UpdateResult>;

    /// Update every matching document.
    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
        options: UpdateOptions,
    ) -> RewindResult<UpdateResult>;

    /// Delete the first matching document.
    async fn delete_one(&self, collection: &str, filter: &Filter) -> RewindResult<DeleteResult>;

    /// Delete every matching document.
    async fn delete_many(&self, collection: &str, filter: &Filter) -> RewindResult<DeleteResult>;

    /// Apply a batch of heterogeneous writes; either all are applied or none.
    async fn bulk_apply(&self, collection: &str, ops: Vec<WriteOp>)
        -> RewindResult<BulkWriteResult>;

    /// Count documents matching the filter.
    async fn count_documents(&self, collection: &str, filter: &Filter) -> RewindResult<u64>;

    /// Declare a unique index over the given fields. Idempotent.
    async fn ensure_unique_index(&self, collection: &str, fields: &[String]) -> RewindResult<()>;
}
