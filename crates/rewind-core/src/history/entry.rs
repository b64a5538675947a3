//! History entry types.
//!
//! One [`HistoryEntry`] is written per create/update/delete of a tracked
//! document. Entries are immutable once stored.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::error::{RewindError, RewindResult};
use crate::types::Document;

/// Operation that produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HistoryOperation {
    Create,
    Update,
    Delete,
}

/// Before/after values of one top-level field.
///
/// `None` means the field was absent; `Some(Value::Null)` means it held null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub from: Option<Value>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub to: Option<Value>,
}

impl FieldChange {
    pub fn new(from: Option<Value>, to: Option<Value>) -> Self {
        Self { from, to }
    }
}

// A present key always deserializes to `Some`, even when it holds null.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Field name to change, ordered by field name.
pub type ChangeSet = BTreeMap<String, FieldChange>;

/// One immutable record of a state transition of a tracked document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Collection the tracked document lives in.
    pub collection: String,
    /// Id of the tracked document.
    pub document_id: String,
    /// Gapless per-document version, starting at 1.
    pub version: u32,
    /// What happened.
    pub operation: HistoryOperation,
    /// Full document state after the operation (last live state for deletes).
    pub snapshot: Document,
    /// Field changes; `None` for create and delete.
    pub changes: Option<ChangeSet>,
    /// Who or what performed the change.
    pub actor: String,
    /// When the entry was written.
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Serialize into a storable document.
    pub fn to_document(&self) -> RewindResult<Document> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(RewindError::internal(format!(
                "history entry serialized to non-object: {}",
                other
            ))),
        }
    }

    /// Parse a stored document. Store-managed fields are ignored.
    pub fn from_document(doc: Document) -> RewindResult<Self> {
        Ok(serde_json::from_value(Value::Object(doc))?)
    }
}

/// Summary of the history of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub document_id: String,
    pub total_versions: u32,
    pub latest_version: u32,
    pub first_recorded: DateTime<Utc>,
    pub last_recorded: DateTime<Utc>,
    pub updates: u32,
    pub deleted: bool,
}

impl HistorySummary {
    /// Summarize entries ordered by ascending version. `None` when empty.
    pub fn from_entries(document_id: &str, entries: &[HistoryEntry]) -> Option<Self> {
        let first = entries.first()?;
        let last = entries.last()?;
        Some(Self {
            document_id: document_id.to_string(),
            total_versions: entries.len() as u32,
            latest_version: last.version,
            first_recorded: first.recorded_at,
            last_recorded: last.recorded_at,
            updates: entries
                .iter()
                .filter(|e| e.operation == HistoryOperation::Update)
                .count() as u32,
            deleted: last.operation == HistoryOperation::Delete,
        })
    }
}
