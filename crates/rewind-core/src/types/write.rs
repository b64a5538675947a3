//! Write operations and their results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::Document;
use super::filter::{Filter, FilterOperator};

/// A field-level modification applied by `update_one` / `update_many`.
///
/// Renames run first, then sets, then unsets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Fields to set (top-level).
    #[serde(default)]
    pub set: Document,
    /// Fields to remove.
    #[serde(default)]
    pub unset: Vec<String>,
    /// Fields to rename, as `(from, to)` pairs.
    #[serde(default)]
    pub rename: Vec<(String, String)>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch setting a single field.
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and_set(field, value)
    }

    /// Patch removing a single field.
    pub fn unset(field: impl Into<String>) -> Self {
        Self::new().and_unset(field)
    }

    /// Patch renaming a single field.
    pub fn rename(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new().and_rename(from, to)
    }

    /// Patch setting every field of `doc`.
    pub fn set_all(doc: Document) -> Self {
        Self {
            set: doc,
            ..Self::default()
        }
    }

    pub fn and_set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn and_unset(mut self, field: impl Into<String>) -> Self {
        self.unset.push(field.into());
        self
    }

    pub fn and_rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rename.push((from.into(), to.into()));
        self
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.rename.is_empty()
    }

    /// Apply the patch to a document. Returns whether anything changed.
    pub fn apply_to(&self, doc: &mut Document) -> bool {
        let mut modified = false;

        for (from, to) in &self.rename {
            if from == to {
                continue;
            }
            if let Some(value) = doc.remove(from) {
                doc.insert(to.clone(), value);
                modified = true;
            }
        }

        for (field, value) in &self.set {
            if doc.get(field) != Some(value) {
                doc.insert(field.clone(), value.clone());
                modified = true;
            }
        }

        for field in &self.unset {
            if doc.remove(field).is_some() {
                modified = true;
            }
        }

        modified
    }

    /// Seed document for an upsert: equality conditions of the filter plus the patch.
    pub fn upsert_seed(&self, filter: &Filter) -> Document {
        let mut doc = Document::new();
        collect_equalities(filter, &mut doc);
        self.apply_to(&mut doc);
        doc
    }
}

fn collect_equalities(filter: &Filter, doc: &mut Document) {
    match filter {
        Filter::Condition(cond) => {
            if let FilterOperator::Eq(value) = &cond.operator {
                if !cond.field.contains('.') {
                    doc.insert(cond.field.clone(), value.clone());
                }
            }
        }
        Filter::And(filters) => filters.iter().for_each(|f| collect_equalities(f, doc)),
        Filter::Or(_) | Filter::Not(_) => {}
    }
}

/// Options for update operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert a new document when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

/// Result of an update operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upserted_id: Option<String>,
}

/// Result of a delete operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub deleted: u64,
}

/// One operation of a batched heterogeneous write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Insert(Document),
    UpdateOne { filter: Filter, patch: Patch },
    DeleteOne { filter: Filter },
}

/// Result of a batched write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkWriteResult {
    pub inserted: u64,
    pub matched: u64,
    pub modified: u64,
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::document::from_value;
    use serde_json::json;

    #[test]
    fn test_patch_order_and_modified_flag() {
        let mut doc = from_value(json!({"_id": "a", "old": 1, "keep": true}));
        let patch = Patch::rename("old", "new").and_set("keep", true).and_unset("missing");
        assert!(patch.apply_to(&mut doc));
        assert_eq!(Value::Object(doc.clone()), json!({"_id": "a", "new": 1, "keep": true}));

        // Applying again is a no-op.
        assert!(!patch.apply_to(&mut doc));
    }

    #[test]
    fn test_upsert_seed_uses_equalities() {
        let filter = Filter::and(vec![Filter::eq("name", "n1"), Filter::gt("version", 1)]);
        let seed = Patch::set("status", "active").upsert_seed(&filter);
        assert_eq!(Value::Object(seed), json!({"name": "n1", "status": "active"}));
    }
}
