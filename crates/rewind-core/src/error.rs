//! Error types for rewind operations.
//!
//! Every failure carries a structured [`ErrorCode`] plus the context an
//! operator needs (document id, version, migration name) to decide on manual
//! remediation.

use thiserror::Error;

use crate::migration::{ApplySummary, MigrationDirection};

/// Result type alias for rewind operations.
pub type RewindResult<T> = Result<T, RewindError>;

/// Main error type for all rewind operations.
#[derive(Error, Debug)]
pub enum RewindError {
    /// The backing document store failed (includes duplicate keys and timeouts).
    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A requested document or history version does not exist.
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        code: ErrorCode,
        document_id: Option<String>,
        version: Option<u32>,
    },

    /// A migration definition was rejected at construction time.
    #[error("Invalid migration definition: {message}")]
    InvalidDefinition {
        message: String,
        migration: Option<String>,
    },

    /// The ledger references a migration that is no longer registered.
    #[error("Unknown migration: '{name}' is recorded as applied but not registered")]
    UnknownMigration { name: String },

    /// Rollback requested for a migration without a revert operation.
    #[error("Migration '{name}' has no revert operation and cannot be rolled back")]
    NotReversible { name: String },

    /// A migration name is already registered or already present in the ledger.
    #[error("Duplicate migration name: '{name}'")]
    DuplicateName { name: String },

    /// A migration's apply or revert operation failed.
    #[error("Migration '{name}' (v{version}) failed during {direction}: {source}")]
    MigrationFailed {
        name: String,
        version: i64,
        direction: MigrationDirection,
        #[source]
        source: Box<RewindError>,
        /// Results of the run up to and including the failure, for apply runs.
        summary: Option<Box<ApplySummary>>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,
    DbDuplicateKey,

    // History (HIST_xxx)
    HistDocumentNotFound,
    HistVersionNotFound,

    // Migration (MIG_xxx)
    MigInvalidDefinition,
    MigUnknown,
    MigNotReversible,
    MigDuplicateName,
    MigApplyFailed,
    MigRevertFailed,

    // Configuration (CFG_xxx)
    CfgInvalid,

    // Parse (PARSE_xxx)
    ParseInvalidJson,

    // IO
    Io,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::DbDuplicateKey => "DB_003",
            ErrorCode::HistDocumentNotFound => "HIST_001",
            ErrorCode::HistVersionNotFound => "HIST_002",
            ErrorCode::MigInvalidDefinition => "MIG_001",
            ErrorCode::MigUnknown => "MIG_002",
            ErrorCode::MigNotReversible => "MIG_003",
            ErrorCode::MigDuplicateName => "MIG_004",
            ErrorCode::MigApplyFailed => "MIG_005",
            ErrorCode::MigRevertFailed => "MIG_006",
            ErrorCode::CfgInvalid => "CFG_001",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::Io => "IO_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl RewindError {
    /// Create a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Create a persistence error wrapping a backend error.
    pub fn database_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Persistence {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            code: ErrorCode::DbConnectionFailed,
            source: None,
        }
    }

    /// Create a duplicate-key error (unique index violation).
    pub fn duplicate_key(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            code: ErrorCode::DbDuplicateKey,
            source: None,
        }
    }

    /// Create a not found error for a live document.
    pub fn not_found(document_id: impl Into<String>) -> Self {
        let id = document_id.into();
        Self::NotFound {
            message: format!("Document with id '{}' not found", id),
            code: ErrorCode::HistDocumentNotFound,
            document_id: Some(id),
            version: None,
        }
    }

    /// Create a not found error for a history version.
    pub fn version_not_found(document_id: impl Into<String>, version: u32) -> Self {
        let id = document_id.into();
        Self::NotFound {
            message: format!("Version {} of document '{}' not found", version, id),
            code: ErrorCode::HistVersionNotFound,
            document_id: Some(id),
            version: Some(version),
        }
    }

    /// Create an invalid definition error.
    pub fn invalid_definition(message: impl Into<String>, migration: Option<String>) -> Self {
        Self::InvalidDefinition {
            message: message.into(),
            migration,
        }
    }

    /// Create an unknown migration error.
    pub fn unknown_migration(name: impl Into<String>) -> Self {
        Self::UnknownMigration { name: name.into() }
    }

    /// Create a not reversible error.
    pub fn not_reversible(name: impl Into<String>) -> Self {
        Self::NotReversible { name: name.into() }
    }

    /// Create a duplicate name error.
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    /// Wrap a failure raised by a migration's apply or revert operation.
    pub fn migration_failed(
        name: impl Into<String>,
        version: i64,
        direction: MigrationDirection,
        source: RewindError,
    ) -> Self {
        Self::MigrationFailed {
            name: name.into(),
            version,
            direction,
            source: Box::new(source),
            summary: None,
        }
    }

    /// Attach the results of the run that a failed migration stopped.
    pub fn with_summary(self, run: ApplySummary) -> Self {
        match self {
            Self::MigrationFailed {
                name,
                version,
                direction,
                source,
                ..
            } => Self::MigrationFailed {
                name,
                version,
                direction,
                source,
                summary: Some(Box::new(run)),
            },
            other => other,
        }
    }

    /// The partial run summary carried by a stopped apply run.
    pub fn summary(&self) -> Option<&ApplySummary> {
        match self {
            Self::MigrationFailed { summary, .. } => summary.as_deref(),
            _ => None,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error is a unique index violation reported by the store.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(
            self,
            Self::Persistence {
                code: ErrorCode::DbDuplicateKey,
                ..
            }
        )
    }

    /// Whether this error means "the thing does not exist" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Persistence { code, .. } => *code,
            Self::NotFound { code, .. } => *code,
            Self::InvalidDefinition { .. } => ErrorCode::MigInvalidDefinition,
            Self::UnknownMigration { .. } => ErrorCode::MigUnknown,
            Self::NotReversible { .. } => ErrorCode::MigNotReversible,
            Self::DuplicateName { .. } => ErrorCode::MigDuplicateName,
            Self::MigrationFailed { direction, .. } => match direction {
                MigrationDirection::Apply => ErrorCode::MigApplyFailed,
                MigrationDirection::Revert => ErrorCode::MigRevertFailed,
            },
            Self::Configuration(_) => ErrorCode::CfgInvalid,
            Self::Serialization(_) => ErrorCode::ParseInvalidJson,
            Self::Io(_) => ErrorCode::Io,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Persistence {
                code: ErrorCode::DbDuplicateKey,
                ..
            } => Some("Another writer committed the same key; re-read the current state before retrying"),
            Self::Persistence { .. } => Some("Please check the document store connection and retry"),
            Self::NotFound { .. } => Some("Please check the document id and version"),
            Self::UnknownMigration { .. } => {
                Some("Register the migration again or remove its ledger record manually")
            }
            Self::NotReversible { .. } => {
                Some("Add a revert operation to the migration or restore data manually")
            }
            Self::MigrationFailed { .. } => {
                Some("Inspect the data, then retry, skip or patch the migration manually")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = RewindError::version_not_found("doc-1", 3);
        assert_eq!(err.code(), ErrorCode::HistVersionNotFound);
        assert!(err.is_not_found());
        assert!(err.to_string().contains("doc-1"));
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_duplicate_key_is_distinguishable() {
        let dup = RewindError::duplicate_key("migrations.name");
        let other = RewindError::persistence("disk full");
        assert!(dup.is_duplicate_key());
        assert!(!other.is_duplicate_key());
        assert_eq!(dup.code().as_str(), "DB_003");
    }

    #[test]
    fn test_migration_failed_code_follows_direction() {
        let err = RewindError::migration_failed(
            "addStatus",
            1,
            MigrationDirection::Revert,
            RewindError::internal("boom"),
        );
        assert_eq!(err.code(), ErrorCode::MigRevertFailed);
        assert!(err.to_string().contains("revert"));
    }
}
