//! In-memory collection engine shared by the store backends.
//!
//! Evaluates filters, sorts, patches and unique indexes over a vector of
//! documents kept in insertion order. Backends that persist elsewhere enable
//! change tracking and flush the recorded [`Change`]s after each operation.

use serde_json::Value;
use uuid::Uuid;

use crate::error::{RewindError, RewindResult};
use crate::types::{
    canonical, document_id, lookup, sort_documents, BulkWriteResult, DeleteResult, Document,
    Filter, Patch, SortKey, UpdateOptions, UpdateResult, WriteOp, ID_FIELD, REVISION_FIELD,
};

/// A persisted-state change produced by a write.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Document inserted or replaced (keyed by its `_id`).
    Upsert(Document),
    /// Document with this id removed.
    Remove(String),
}

/// A named set of documents plus its unique indexes.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    name: String,
    docs: Vec<Document>,
    unique_indexes: Vec<Vec<String>>,
    changes: Option<Vec<Change>>,
}

impl Collection {
    /// Create an empty collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Rebuild a collection from persisted parts.
    pub fn from_parts(
        name: impl Into<String>,
        docs: Vec<Document>,
        unique_indexes: Vec<Vec<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            docs,
            unique_indexes,
            changes: None,
        }
    }

    /// Record every write as a [`Change`] until [`Collection::take_changes`].
    pub fn with_change_tracking(mut self) -> Self {
        self.changes = Some(Vec::new());
        self
    }

    /// Drain the changes recorded so far.
    pub fn take_changes(&mut self) -> Vec<Change> {
        self.changes.as_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn documents(&self) -> &[Document] {
        &self.docs
    }

    pub fn unique_indexes(&self) -> &[Vec<String>] {
        &self.unique_indexes
    }

    fn record(&mut self, change: Change) {
        if let Some(changes) = self.changes.as_mut() {
            changes.push(change);
        }
    }

    /// Declare a unique index. Fails if existing documents already collide.
    ///
    /// Returns `true` when the index is new.
    pub fn add_unique_index(&mut self, fields: &[String]) -> RewindResult<bool> {
        if self.unique_indexes.iter().any(|idx| idx.as_slice() == fields) {
            return Ok(false);
        }
        for (pos, doc) in self.docs.iter().enumerate() {
            if let Some(key) = index_key(doc, fields) {
                let clash = self.docs[pos + 1..]
                    .iter()
                    .any(|other| index_key(other, fields).as_deref() == Some(key.as_str()));
                if clash {
                    return Err(RewindError::duplicate_key(format!(
                        "cannot create unique index {:?} on '{}': duplicate key {}",
                        fields, self.name, key
                    )));
                }
            }
        }
        self.unique_indexes.push(fields.to_vec());
        Ok(true)
    }

    /// Check `candidate` against every other document. `skip` is the
    /// position the candidate replaces, if any.
    fn check_unique(&self, candidate: &Document, skip: Option<usize>) -> RewindResult<()> {
        let mut indexes: Vec<Vec<String>> = vec![vec![ID_FIELD.to_string()]];
        indexes.extend(self.unique_indexes.iter().cloned());

        for fields in &indexes {
            let Some(key) = index_key(candidate, fields) else {
                continue;
            };
            let clash = self.docs.iter().enumerate().any(|(pos, other)| {
                Some(pos) != skip && index_key(other, fields).as_deref() == Some(key.as_str())
            });
            if clash {
                return Err(RewindError::duplicate_key(format!(
                    "duplicate key in '{}' for index {:?}: {}",
                    self.name, fields, key
                )));
            }
        }
        Ok(())
    }

    /// Insert a document, assigning `_id` and `__v` when absent.
    pub fn insert(&mut self, mut doc: Document) -> RewindResult<String> {
        let id = match doc.get(ID_FIELD) {
            Some(Value::String(id)) => id.clone(),
            None | Some(Value::Null) => {
                let id = Uuid::new_v4().to_string();
                doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
            Some(other) => {
                return Err(RewindError::persistence(format!(
                    "'{}' in '{}' must be a string, got {}",
                    ID_FIELD, self.name, other
                )));
            }
        };
        doc.entry(REVISION_FIELD.to_string())
            .or_insert_with(|| Value::from(0u64));

        self.check_unique(&doc, None)?;
        self.record(Change::Upsert(doc.clone()));
        self.docs.push(doc);
        Ok(id)
    }

    /// Matching documents, sorted and limited. A limit of zero means unbounded.
    pub fn find(&self, filter: &Filter, sort: &[SortKey], limit: Option<usize>) -> Vec<Document> {
        let mut matched: Vec<Document> = self
            .docs
            .iter()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect();
        sort_documents(&mut matched, sort);
        if let Some(limit) = limit.filter(|l| *l > 0) {
            matched.truncate(limit);
        }
        matched
    }

    /// First matching document in sort order.
    pub fn find_one(&self, filter: &Filter, sort: &[SortKey]) -> Option<Document> {
        if sort.is_empty() {
            return self.docs.iter().find(|doc| filter.matches(doc)).cloned();
        }
        self.find(filter, sort, Some(1)).into_iter().next()
    }

    /// Count matching documents.
    pub fn count(&self, filter: &Filter) -> u64 {
        self.docs.iter().filter(|doc| filter.matches(doc)).count() as u64
    }

    /// Update the first (`many == false`) or every matching document.
    ///
    /// Either every targeted document is updated or, on a unique index
    /// violation, none is.
    pub fn update(
        &mut self,
        filter: &Filter,
        patch: &Patch,
        options: UpdateOptions,
        many: bool,
    ) -> RewindResult<UpdateResult> {
        let targets: Vec<usize> = {
            let iter = self
                .docs
                .iter()
                .enumerate()
                .filter(|(_, doc)| filter.matches(doc))
                .map(|(pos, _)| pos);
            if many {
                iter.collect()
            } else {
                iter.take(1).collect()
            }
        };

        if targets.is_empty() {
            if options.upsert {
                let id = self.insert(patch.upsert_seed(filter))?;
                return Ok(UpdateResult {
                    matched: 0,
                    modified: 0,
                    upserted_id: Some(id),
                });
            }
            return Ok(UpdateResult::default());
        }

        let mut staged = self.clone();
        let mut result = UpdateResult {
            matched: targets.len() as u64,
            ..UpdateResult::default()
        };
        for pos in targets {
            let mut doc = staged.docs[pos].clone();
            if !patch.apply_to(&mut doc) {
                continue;
            }
            bump_revision(&mut doc);
            staged.check_unique(&doc, Some(pos))?;
            staged.record(Change::Upsert(doc.clone()));
            staged.docs[pos] = doc;
            result.modified += 1;
        }
        *self = staged;
        Ok(result)
    }

    /// Delete the first (`many == false`) or every matching document.
    pub fn delete(&mut self, filter: &Filter, many: bool) -> DeleteResult {
        let mut deleted = 0u64;
        let mut kept = Vec::with_capacity(self.docs.len());
        let mut removed = Vec::new();
        for doc in std::mem::take(&mut self.docs) {
            if (many || deleted == 0) && filter.matches(&doc) {
                deleted += 1;
                if let Some(id) = document_id(&doc) {
                    removed.push(id);
                }
            } else {
                kept.push(doc);
            }
        }
        self.docs = kept;
        for id in removed {
            self.record(Change::Remove(id));
        }
        DeleteResult { deleted }
    }

    /// Apply a batch of writes atomically.
    pub fn bulk(&mut self, ops: Vec<WriteOp>) -> RewindResult<BulkWriteResult> {
        let mut staged = self.clone();
        let mut result = BulkWriteResult::default();
        for op in ops {
            match op {
                WriteOp::Insert(doc) => {
                    staged.insert(doc)?;
                    result.inserted += 1;
                }
                WriteOp::UpdateOne { filter, patch } => {
                    let r = staged.update(&filter, &patch, UpdateOptions::default(), false)?;
                    result.matched += r.matched;
                    result.modified += r.modified;
                }
                WriteOp::DeleteOne { filter } => {
                    result.deleted += staged.delete(&filter, false).deleted;
                }
            }
        }
        *self = staged;
        Ok(result)
    }
}

fn bump_revision(doc: &mut Document) {
    let next = doc
        .get(REVISION_FIELD)
        .and_then(Value::as_u64)
        .unwrap_or(0)
        + 1;
    doc.insert(REVISION_FIELD.to_string(), Value::from(next));
}

/// Composite key of a document for an index; `None` if any field is missing.
fn index_key(doc: &Document, fields: &[String]) -> Option<String> {
    let parts: Option<Vec<String>> = fields
        .iter()
        .map(|f| lookup(doc, f).map(canonical))
        .collect();
    parts.map(|p| p.join("\u{1f}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::from_value;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_insert_assigns_identity() {
        let mut coll = Collection::new("users");
        let id = coll.insert(from_value(json!({"name": "A"}))).unwrap();
        let doc = coll.find_one(&Filter::id(id.clone()), &[]).unwrap();
        assert_eq!(doc["_id"], json!(id));
        assert_eq!(doc["__v"], json!(0));
    }

    #[test]
    fn test_insert_rejects_non_string_id() {
        let mut coll = Collection::new("users").with_change_tracking();
        let err = coll
            .insert(from_value(json!({"_id": 7, "name": "A"})))
            .unwrap_err();
        assert!(matches!(err, RewindError::Persistence { .. }));
        assert!(coll.documents().is_empty());
        assert!(coll.take_changes().is_empty());

        let id = coll
            .insert(from_value(json!({"_id": "u-7", "name": "A"})))
            .unwrap();
        assert_eq!(id, "u-7");
        assert!(coll.find_one(&Filter::id("u-7"), &[]).is_some());
    }

    #[test]
    fn test_unique_index_rejects_duplicates() {
        let mut coll = Collection::new("history");
        coll.add_unique_index(&fields(&["documentId", "version"]))
            .unwrap();
        coll.insert(from_value(json!({"documentId": "d", "version": 1})))
            .unwrap();
        coll.insert(from_value(json!({"documentId": "d", "version": 2})))
            .unwrap();
        let err = coll
            .insert(from_value(json!({"documentId": "d", "version": 2})))
            .unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(coll.count(&Filter::all()), 2);
    }

    #[test]
    fn test_update_many_bumps_revision_only_when_modified() {
        let mut coll = Collection::new("users");
        coll.insert(from_value(json!({"_id": "a", "status": "active"})))
            .unwrap();
        coll.insert(from_value(json!({"_id": "b"}))).unwrap();

        let result = coll
            .update(
                &Filter::all(),
                &Patch::set("status", "active"),
                UpdateOptions::default(),
                true,
            )
            .unwrap();
        assert_eq!(result.matched, 2);
        assert_eq!(result.modified, 1);

        let a = coll.find_one(&Filter::id("a"), &[]).unwrap();
        let b = coll.find_one(&Filter::id("b"), &[]).unwrap();
        assert_eq!(a["__v"], json!(0));
        assert_eq!(b["__v"], json!(1));
    }

    #[test]
    fn test_upsert_inserts_seed() {
        let mut coll = Collection::new("counters");
        let result = coll
            .update(
                &Filter::eq("name", "c1"),
                &Patch::set("value", 1),
                UpdateOptions::upsert(),
                false,
            )
            .unwrap();
        assert!(result.upserted_id.is_some());
        assert_eq!(coll.count(&Filter::eq("name", "c1")), 1);
    }

    #[test]
    fn test_bulk_is_all_or_nothing() {
        let mut coll = Collection::new("users");
        coll.insert(from_value(json!({"_id": "a"}))).unwrap();

        let err = coll
            .bulk(vec![
                WriteOp::UpdateOne {
                    filter: Filter::id("a"),
                    patch: Patch::set("x", 1),
                },
                WriteOp::Insert(from_value(json!({"_id": "a"}))),
            ])
            .unwrap_err();
        assert!(err.is_duplicate_key());

        let a = coll.find_one(&Filter::id("a"), &[]).unwrap();
        assert!(a.get("x").is_none());
    }

    #[test]
    fn test_change_tracking_records_writes() {
        let mut coll = Collection::new("users").with_change_tracking();
        coll.insert(from_value(json!({"_id": "a"}))).unwrap();
        coll.delete(&Filter::id("a"), false);
        let changes = coll.take_changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1], Change::Remove("a".to_string()));
        assert!(coll.take_changes().is_empty());
    }
}
