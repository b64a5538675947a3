//! Bulk field operations for use inside migrations.
//!
//! Each helper is idempotent: running it a second time finds nothing left to
//! change and reports zero modified documents.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::RewindResult;
use crate::traits::DocumentStore;
use crate::types::{canonical, Filter, Patch, UpdateOptions, WriteOp, ID_FIELD};

/// Field-level bulk updates over one collection.
pub struct FieldHelper {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl FieldHelper {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Set `field` to `default` on every document that lacks it.
    pub async fn add_field(&self, field: &str, default: impl Into<Value>) -> RewindResult<u64> {
        let result = self
            .store
            .update_many(
                &self.collection,
                &Filter::not_exists(field),
                &Patch::set(field, default),
                UpdateOptions::default(),
            )
            .await?;
        debug!(collection = %self.collection, field, modified = result.modified, "Added field");
        Ok(result.modified)
    }

    /// Remove `field` from every document that has it.
    pub async fn remove_field(&self, field: &str) -> RewindResult<u64> {
        let result = self
            .store
            .update_many(
                &self.collection,
                &Filter::exists(field),
                &Patch::unset(field),
                UpdateOptions::default(),
            )
            .await?;
        debug!(collection = %self.collection, field, modified = result.modified, "Removed field");
        Ok(result.modified)
    }

    /// Rename `from` to `to` on every document that has `from`.
    pub async fn rename_field(&self, from: &str, to: &str) -> RewindResult<u64> {
        if from == to {
            return Ok(0);
        }
        let result = self
            .store
            .update_many(
                &self.collection,
                &Filter::exists(from),
                &Patch::rename(from, to),
                UpdateOptions::default(),
            )
            .await?;
        debug!(collection = %self.collection, from, to, modified = result.modified, "Renamed field");
        Ok(result.modified)
    }

    /// Replace the value of `field` with `transform(value)` on every document
    /// that has it. All changes are submitted as one batch; documents whose
    /// value comes back unchanged are left alone.
    pub async fn transform_field<F>(&self, field: &str, transform: F) -> RewindResult<u64>
    where
        F: Fn(&Value) -> Value + Send + Sync,
    {
        let docs = self
            .store
            .find(&self.collection, &Filter::exists(field), &[], None)
            .await?;

        let ops: Vec<WriteOp> = docs
            .iter()
            .filter_map(|doc| {
                let id = doc.get(ID_FIELD)?;
                let current = doc.get(field)?;
                let next = transform(current);
                if canonical(&next) == canonical(current) {
                    return None;
                }
                Some(WriteOp::UpdateOne {
                    filter: Filter::eq(ID_FIELD, id.clone()),
                    patch: Patch::set(field, next),
                })
            })
            .collect();

        if ops.is_empty() {
            return Ok(0);
        }

        let result = self.store.bulk_apply(&self.collection, ops).await?;
        debug!(
            collection = %self.collection,
            field,
            modified = result.modified,
            "Transformed field"
        );
        Ok(result.modified)
    }
}
