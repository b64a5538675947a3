//! Ledger records and run reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RewindError, RewindResult};
use crate::types::Document;

use super::definition::MigrationDefinition;

/// Ledger entry for an applied migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    pub name: String,
    pub version: i64,
    pub description: String,
    pub applied_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl MigrationRecord {
    /// Serialize into a storable document.
    pub fn to_document(&self) -> RewindResult<Document> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(RewindError::internal(format!(
                "migration record serialized to non-object: {}",
                other
            ))),
        }
    }

    /// Parse a stored document. Store-managed fields are ignored.
    pub fn from_document(doc: Document) -> RewindResult<Self> {
        Ok(serde_json::from_value(Value::Object(doc))?)
    }
}

/// Options for [`super::MigrationRunner::apply_migrations`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOptions {
    /// Keep going after a failed migration instead of stopping.
    pub continue_on_error: bool,
}

impl ApplyOptions {
    pub fn continue_on_error() -> Self {
        Self {
            continue_on_error: true,
        }
    }

    pub fn stop_on_error() -> Self {
        Self {
            continue_on_error: false,
        }
    }
}

/// Outcome of one migration within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationResult {
    pub name: String,
    pub version: i64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MigrationResult {
    pub(crate) fn succeeded(def: &MigrationDefinition, duration_ms: u64) -> Self {
        Self {
            name: def.name().to_string(),
            version: def.version(),
            success: true,
            duration_ms: Some(duration_ms),
            error: None,
        }
    }

    pub(crate) fn failed(def: &MigrationDefinition, error: &RewindError) -> Self {
        Self {
            name: def.name().to_string(),
            version: def.version(),
            success: false,
            duration_ms: None,
            error: Some(error.to_string()),
        }
    }
}

/// Counts and per-migration results of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub applied: usize,
    pub failed: usize,
    pub results: Vec<MigrationResult>,
}

impl ApplySummary {
    /// Check if the run completed without failures.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Result of [`super::MigrationRunner::apply_migrations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Nothing was pending; the ledger was not touched.
    NothingToApply,
    /// Pending migrations were executed.
    Completed(ApplySummary),
}

impl ApplyOutcome {
    /// The run summary, empty when nothing was pending.
    pub fn summary(&self) -> ApplySummary {
        match self {
            Self::NothingToApply => ApplySummary::default(),
            Self::Completed(summary) => summary.clone(),
        }
    }
}

/// A migration that was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackResult {
    pub name: String,
    pub version: i64,
    pub duration_ms: u64,
}

/// Result of [`super::MigrationRunner::rollback_last_migration`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The ledger was empty.
    NothingToRollback,
    /// The most recently applied migration was reverted.
    RolledBack(RollbackResult),
}

/// Migrations reverted by [`super::MigrationRunner::rollback_to_version`], in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackSummary {
    pub rolled_back: Vec<RollbackResult>,
}

/// A registered migration not yet applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMigration {
    pub name: String,
    pub version: i64,
    pub description: String,
    pub reversible: bool,
}

impl From<&MigrationDefinition> for PendingMigration {
    fn from(def: &MigrationDefinition) -> Self {
        Self {
            name: def.name().to_string(),
            version: def.version(),
            description: def.description().to_string(),
            reversible: def.is_reversible(),
        }
    }
}

/// Applied and pending migrations, each ascending by version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub applied: Vec<MigrationRecord>,
    pub pending: Vec<PendingMigration>,
}
