//! SQLite document store.
//!
//! Documents are stored as JSON text in a single `documents` table keyed by
//! `(collection, id)`, with unique index declarations kept alongside in
//! `unique_indexes`. Queries and writes are evaluated by the shared
//! [`Collection`] engine; each write is flushed back in one transaction, so a
//! failed operation leaves the database untouched.
//!
//! Top-level equality conditions are narrowed in SQL (`id` column or
//! `json_extract`) before the engine filters the candidates. Inserts load
//! only the documents that could collide on a unique index. `documentId` has
//! an expression index so history lookups stay indexed as the log grows.
//!
//! # Example
//!
//! ```ignore
//! use rewind_stores::SqliteStore;
//!
//! let store = SqliteStore::open("/var/lib/app/rewind.db")?;
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;

use rewind_core::error::{ErrorCode, RewindError, RewindResult};
use rewind_core::store::{Change, Collection};
use rewind_core::traits::DocumentStore;
use rewind_core::types::{
    document_id, BulkWriteResult, DeleteResult, Document, Filter, FilterCondition,
    FilterOperator, Patch, SortKey, UpdateOptions, UpdateResult, WriteOp, ID_FIELD,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    body TEXT NOT NULL,
    UNIQUE(collection, id)
);
CREATE TABLE IF NOT EXISTS unique_indexes (
    collection TEXT NOT NULL,
    fields TEXT NOT NULL,
    PRIMARY KEY(collection, fields)
);
CREATE INDEX IF NOT EXISTS documents_document_id
    ON documents(collection, json_extract(body, '$.documentId'));
"#;

/// An equality the database can evaluate: a top-level field and a bindable value.
#[derive(Debug, Clone, PartialEq)]
struct SqlEq<'a> {
    field: &'a str,
    value: SqlValue,
}

/// Field names that are safe to inline into a JSON path literal.
fn is_plain_field(field: &str) -> bool {
    !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// JSON values whose `json_extract` result compares equal under SQL `=`.
fn sql_value(value: &Value) -> Option<SqlValue> {
    match value {
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        Value::Number(n) if n.is_f64() => n.as_f64().map(SqlValue::Real),
        Value::Number(n) => n.as_i64().map(SqlValue::Integer),
        _ => None,
    }
}

/// Equalities that every document matching `filter` satisfies.
///
/// The result only narrows: callers must still evaluate `filter` itself.
fn pushdown(filter: &Filter) -> Vec<SqlEq<'_>> {
    match filter {
        Filter::Condition(FilterCondition {
            field,
            operator: FilterOperator::Eq(value),
        }) if is_plain_field(field) => sql_value(value)
            .map(|value| SqlEq { field, value })
            .into_iter()
            .collect(),
        Filter::And(filters) => filters.iter().flat_map(pushdown).collect(),
        _ => Vec::new(),
    }
}

/// Equalities selecting the documents `doc` could collide with, one set per
/// unique index. `None` when some index cannot be narrowed in SQL.
fn conflict_sets<'a>(
    doc: &'a Document,
    indexes: &'a [Vec<String>],
) -> Option<Vec<Vec<SqlEq<'a>>>> {
    let mut sets = Vec::new();
    if let Some(Value::String(id)) = doc.get(ID_FIELD) {
        sets.push(vec![SqlEq {
            field: ID_FIELD,
            value: SqlValue::Text(id.clone()),
        }]);
    }
    for fields in indexes {
        let mut set = Vec::with_capacity(fields.len());
        for field in fields {
            if !is_plain_field(field) {
                return None;
            }
            // A document lacking an indexed field is not checked against it.
            let Some(value) = doc.get(field.as_str()) else {
                set.clear();
                break;
            };
            set.push(SqlEq {
                field,
                value: sql_value(value)?,
            });
        }
        if !set.is_empty() {
            sets.push(set);
        }
    }
    Some(sets)
}

/// SQLite-backed [`DocumentStore`].
pub struct SqliteStore {
    /// SQLite connection (wrapped in Mutex for Send + Sync).
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> RewindResult<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| RewindError::Persistence {
            message: format!(
                "Failed to open SQLite database {}: {}",
                path.as_ref().display(),
                e
            ),
            code: ErrorCode::DbConnectionFailed,
            source: Some(Box::new(e)),
        })?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> RewindResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| RewindError::Persistence {
            message: format!("Failed to open in-memory SQLite database: {}", e),
            code: ErrorCode::DbConnectionFailed,
            source: Some(Box::new(e)),
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> RewindResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| RewindError::database_source("Failed to create schema", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> RewindResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RewindError::persistence("SQLite connection lock poisoned"))
    }

    /// Documents of `collection` satisfying every equality, in insertion order.
    fn load_documents(
        conn: &Connection,
        collection: &str,
        conditions: &[SqlEq<'_>],
    ) -> RewindResult<Vec<Document>> {
        let mut sql = String::from("SELECT body FROM documents WHERE collection = ?1");
        let mut values = vec![SqlValue::Text(collection.to_string())];
        for cond in conditions {
            values.push(cond.value.clone());
            if cond.field == ID_FIELD {
                sql.push_str(&format!(" AND id = ?{}", values.len()));
            } else {
                sql.push_str(&format!(
                    " AND json_extract(body, '$.{}') = ?{}",
                    cond.field,
                    values.len()
                ));
            }
        }
        sql.push_str(" ORDER BY seq");

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| RewindError::database_source("Failed to prepare query", e))?;
        let bodies = stmt
            .query_map(params_from_iter(values.iter()), |row| row.get::<_, String>(0))
            .map_err(|e| RewindError::database_source("Failed to load documents", e))?;

        let mut docs = Vec::new();
        for body in bodies {
            let body =
                body.map_err(|e| RewindError::database_source("Failed to read document", e))?;
            docs.push(serde_json::from_str::<Document>(&body)?);
        }
        Ok(docs)
    }

    fn load_indexes(conn: &Connection, collection: &str) -> RewindResult<Vec<Vec<String>>> {
        let mut stmt = conn
            .prepare("SELECT fields FROM unique_indexes WHERE collection = ?1 ORDER BY rowid")
            .map_err(|e| RewindError::database_source("Failed to prepare query", e))?;
        let rows = stmt
            .query_map(params![collection], |row| row.get::<_, String>(0))
            .map_err(|e| RewindError::database_source("Failed to load indexes", e))?;

        let mut indexes = Vec::new();
        for fields in rows {
            let fields =
                fields.map_err(|e| RewindError::database_source("Failed to read index", e))?;
            indexes.push(serde_json::from_str::<Vec<String>>(&fields)?);
        }
        Ok(indexes)
    }

    fn load(conn: &Connection, collection: &str) -> RewindResult<Collection> {
        let docs = Self::load_documents(conn, collection, &[])?;
        let indexes = Self::load_indexes(conn, collection)?;
        Ok(Collection::from_parts(collection, docs, indexes))
    }

    /// Only the documents `doc` could collide with, plus every index.
    fn load_for_insert(
        conn: &Connection,
        collection: &str,
        doc: &Document,
    ) -> RewindResult<Collection> {
        let indexes = Self::load_indexes(conn, collection)?;
        let docs = match conflict_sets(doc, &indexes) {
            Some(sets) => {
                let mut seen = HashSet::new();
                let mut docs = Vec::new();
                for set in &sets {
                    for candidate in Self::load_documents(conn, collection, set)? {
                        if document_id(&candidate).map_or(true, |id| seen.insert(id)) {
                            docs.push(candidate);
                        }
                    }
                }
                docs
            }
            None => Self::load_documents(conn, collection, &[])?,
        };
        Ok(Collection::from_parts(collection, docs, indexes))
    }

    fn flush(conn: &mut Connection, collection: &str, changes: Vec<Change>) -> RewindResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let tx = conn
            .transaction()
            .map_err(|e| RewindError::database_source("Failed to begin transaction", e))?;
        for change in changes {
            match change {
                Change::Upsert(doc) => {
                    let id = document_id(&doc).ok_or_else(|| {
                        RewindError::internal("cannot persist a document without '_id'")
                    })?;
                    let body = serde_json::to_string(&doc)?;
                    tx.execute(
                        "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)
                         ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body",
                        params![collection, id, body],
                    )
                    .map_err(|e| RewindError::database_source("Failed to write document", e))?;
                }
                Change::Remove(id) => {
                    tx.execute(
                        "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                        params![collection, id],
                    )
                    .map_err(|e| RewindError::database_source("Failed to delete document", e))?;
                }
            }
        }
        tx.commit()
            .map_err(|e| RewindError::database_source("Failed to commit transaction", e))
    }

    fn add_index(&self, collection: &str, fields: &[String]) -> RewindResult<()> {
        let conn = self.lock()?;
        let mut coll = Self::load(&conn, collection)?;
        if coll.add_unique_index(fields)? {
            let encoded = serde_json::to_string(fields)?;
            conn.execute(
                "INSERT OR IGNORE INTO unique_indexes (collection, fields) VALUES (?1, ?2)",
                params![collection, encoded],
            )
            .map_err(|e| RewindError::database_source("Failed to record unique index", e))?;
            tracing::debug!(collection, fields = ?fields, "Created unique index");
        }
        Ok(())
    }

    fn read<T>(
        &self,
        collection: &str,
        filter: &Filter,
        f: impl FnOnce(&Collection) -> T,
    ) -> RewindResult<T> {
        let conn = self.lock()?;
        let docs = Self::load_documents(&conn, collection, &pushdown(filter))?;
        Ok(f(&Collection::from_parts(collection, docs, Vec::new())))
    }

    fn insert_one(&self, collection: &str, doc: Document) -> RewindResult<String> {
        let mut conn = self.lock()?;
        let mut coll = Self::load_for_insert(&conn, collection, &doc)?.with_change_tracking();
        let id = coll.insert(doc)?;
        Self::flush(&mut conn, collection, coll.take_changes())?;
        Ok(id)
    }

    fn write<T>(
        &self,
        collection: &str,
        f: impl FnOnce(&mut Collection) -> RewindResult<T>,
    ) -> RewindResult<T> {
        let mut conn = self.lock()?;
        let mut coll = Self::load(&conn, collection)?.with_change_tracking();
        let result = f(&mut coll)?;
        Self::flush(&mut conn, collection, coll.take_changes())?;
        Ok(result)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert(&self, collection: &str, doc: Document) -> RewindResult<String> {
        self.insert_one(collection, doc)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &[SortKey],
    ) -> RewindResult<Option<Document>> {
        self.read(collection, filter, |c| c.find_one(filter, sort))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: &[SortKey],
        limit: Option<usize>,
    ) -> RewindResult<Vec<Document>> {
        self.read(collection, filter, |c| c.find(filter, sort, limit))
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
        options: UpdateOptions,
    ) -> RewindResult<UpdateResult> {
        self.write(collection, |c| c.update(filter, patch, options, false))
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
        options: UpdateOptions,
    ) -> RewindResult<UpdateResult> {
        self.write(collection, |c| c.update(filter, patch, options, true))
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> RewindResult<DeleteResult> {
        self.write(collection, |c| Ok(c.delete(filter, false)))
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> RewindResult<DeleteResult> {
        self.write(collection, |c| Ok(c.delete(filter, true)))
    }

    async fn bulk_apply(
        &self,
        collection: &str,
        ops: Vec<WriteOp>,
    ) -> RewindResult<BulkWriteResult> {
        self.write(collection, |c| c.bulk(ops))
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> RewindResult<u64> {
        self.read(collection, filter, |c| c.count(filter))
    }

    async fn ensure_unique_index(&self, collection: &str, fields: &[String]) -> RewindResult<()> {
        self.add_index(collection, fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_core::types::from_value;
    use serde_json::json;

    #[tokio::test]
    async fn test_sqlite_crud() {
        let store = SqliteStore::in_memory().unwrap();

        let id = store
            .insert("users", from_value(json!({"name": "A"})))
            .await
            .unwrap();
        let doc = store
            .find_one("users", &Filter::id(id.as_str()), &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["__v"], json!(0));

        let result = store
            .update_one(
                "users",
                &Filter::id(id.as_str()),
                &Patch::set("name", "B"),
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.modified, 1);

        let doc = store
            .find_one("users", &Filter::id(id.as_str()), &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["name"], json!("B"));
        assert_eq!(doc["__v"], json!(1));

        let deleted = store.delete_one("users", &Filter::id(id.as_str())).await.unwrap();
        assert_eq!(deleted.deleted, 1);
        assert_eq!(store.count_documents("users", &Filter::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sqlite_unique_index() {
        let store = SqliteStore::in_memory().unwrap();
        let fields = vec!["name".to_string()];
        store.ensure_unique_index("users", &fields).await.unwrap();
        store.ensure_unique_index("users", &fields).await.unwrap();

        store
            .insert("users", from_value(json!({"name": "A"})))
            .await
            .unwrap();
        let err = store
            .insert("users", from_value(json!({"name": "A"})))
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(store.count_documents("users", &Filter::all()).await.unwrap(), 1);
    }

    #[test]
    fn test_pushdown_keeps_only_top_level_equalities() {
        let filter = Filter::and(vec![
            Filter::eq("collection", "users"),
            Filter::eq("documentId", "d"),
            Filter::eq("version", 3),
            Filter::eq("meta.kind", "x"),
            Filter::eq("active", true),
            Filter::gt("version", 1),
            Filter::or(vec![Filter::eq("name", "A")]),
        ]);
        let pushed: Vec<&str> = pushdown(&filter).iter().map(|c| c.field).collect();
        assert_eq!(pushed, vec!["collection", "documentId", "version"]);

        assert!(pushdown(&Filter::not(Filter::eq("name", "A"))).is_empty());
        assert!(pushdown(&Filter::eq("it's", "A")).is_empty());
    }

    #[test]
    fn test_conflict_sets_follow_unique_indexes() {
        let indexes = vec![
            vec!["collection".to_string(), "documentId".to_string(), "version".to_string()],
            vec!["email".to_string()],
        ];
        let doc = from_value(json!({
            "_id": "h1",
            "collection": "users",
            "documentId": "d",
            "version": 2,
        }));
        let sets = conflict_sets(&doc, &indexes).unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0][0].field, ID_FIELD);
        assert_eq!(sets[1].len(), 3);

        let nested = vec![vec!["meta.key".to_string()]];
        assert!(conflict_sets(&doc, &nested).is_none());
    }

    #[tokio::test]
    async fn test_narrowed_reads_match_full_scan() {
        let store = SqliteStore::in_memory().unwrap();
        for i in 0..50 {
            store
                .insert(
                    "history",
                    from_value(json!({
                        "collection": "users",
                        "documentId": format!("doc-{}", i % 5),
                        "version": i / 5 + 1,
                        "score": 1.5,
                    })),
                )
                .await
                .unwrap();
        }

        let filter = Filter::and(vec![
            Filter::eq("collection", "users"),
            Filter::eq("documentId", "doc-3"),
        ]);
        assert_eq!(store.count_documents("history", &filter).await.unwrap(), 10);

        let latest = store
            .find_one("history", &filter, &[SortKey::desc("version")])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest["version"], json!(10));

        // Integer 1 and real 1.0 are equal in SQL but not as JSON values.
        let exact = Filter::eq("version", json!(1.0));
        assert_eq!(store.count_documents("history", &exact).await.unwrap(), 0);
        assert_eq!(
            store
                .count_documents("history", &Filter::eq("score", 1.5))
                .await
                .unwrap(),
            50
        );

        // Conditions that cannot be narrowed still filter in the engine.
        let mixed = Filter::and(vec![
            Filter::eq("documentId", "doc-3"),
            Filter::gt("version", 8),
        ]);
        assert_eq!(store.count_documents("history", &mixed).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_narrowed_insert_still_enforces_unique_indexes() {
        let store = SqliteStore::in_memory().unwrap();
        let fields = vec!["documentId".to_string(), "version".to_string()];
        store.ensure_unique_index("history", &fields).await.unwrap();

        for version in 1..=3 {
            store
                .insert(
                    "history",
                    from_value(json!({"documentId": "d", "version": version})),
                )
                .await
                .unwrap();
        }
        let err = store
            .insert("history", from_value(json!({"documentId": "d", "version": 2})))
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());

        let id = store
            .insert("history", from_value(json!({"documentId": "e", "version": 2})))
            .await
            .unwrap();
        let err = store
            .insert("history", from_value(json!({"_id": id, "documentId": "f", "version": 1})))
            .await
            .unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(store.count_documents("history", &Filter::all()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_failed_bulk_writes_nothing() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .ensure_unique_index("users", &["name".to_string()])
            .await
            .unwrap();

        let ops = vec![
            WriteOp::Insert(from_value(json!({"name": "A"}))),
            WriteOp::Insert(from_value(json!({"name": "A"}))),
        ];
        assert!(store.bulk_apply("users", ops).await.is_err());
        assert_eq!(store.count_documents("users", &Filter::all()).await.unwrap(), 0);
    }
}
