//! Configuration system for rewind.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{RewindError, RewindResult};
use crate::types::DEFAULT_IDENTITY_FIELDS;

/// History log configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Collection holding history entries.
    pub collection: String,
    /// Actor recorded when the caller does not name one.
    pub system_actor: String,
    /// Actor prefix marking system-initiated reversions.
    pub revert_actor: String,
    /// Storage identity fields excluded from diffs and stripped on revert.
    pub identity_fields: Vec<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            collection: "history".to_string(),
            system_actor: "system".to_string(),
            revert_actor: "system:revert".to_string(),
            identity_fields: DEFAULT_IDENTITY_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

/// Migration runner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Collection holding the applied-migration ledger.
    pub collection: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            collection: "migrations".to_string(),
        }
    }
}

/// Storage backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    #[default]
    Memory,
    Sqlite,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend to use.
    pub provider: StorageProvider,
    /// Database path (file-backed providers only).
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let rewind_dir = dirs::home_dir()
            .map(|h| h.join(".rewind"))
            .unwrap_or_else(|| PathBuf::from(".rewind"));

        Self {
            provider: StorageProvider::Memory,
            path: rewind_dir.join("rewind.db"),
        }
    }
}

/// Main rewind configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewindConfig {
    pub history: HistoryConfig,
    pub migrations: MigrationConfig,
    pub storage: StorageConfig,
}

impl RewindConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> RewindResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| RewindError::Configuration(e.to_string()))
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| RewindError::Configuration(e.to_string())),
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| RewindError::Configuration(e.to_string())),
            _ => Err(RewindError::Configuration(
                "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables on top of the defaults.
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(collection) = var("REWIND_HISTORY_COLLECTION") {
            self.history.collection = collection;
        }
        if let Some(actor) = var("REWIND_SYSTEM_ACTOR") {
            self.history.system_actor = actor;
        }
        if let Some(collection) = var("REWIND_MIGRATIONS_COLLECTION") {
            self.migrations.collection = collection;
        }
        if let Some(path) = var("REWIND_STORAGE_PATH") {
            self.storage.provider = StorageProvider::Sqlite;
            self.storage.path = PathBuf::from(path);
        }
        self
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> RewindConfigBuilder {
        RewindConfigBuilder::default()
    }
}

/// Builder for RewindConfig.
#[derive(Default)]
pub struct RewindConfigBuilder {
    config: RewindConfig,
}

impl RewindConfigBuilder {
    /// Set the history collection name.
    pub fn history_collection(mut self, name: impl Into<String>) -> Self {
        self.config.history.collection = name.into();
        self
    }

    /// Set the default actor.
    pub fn system_actor(mut self, actor: impl Into<String>) -> Self {
        self.config.history.system_actor = actor.into();
        self
    }

    /// Set the identity fields.
    pub fn identity_fields(mut self, fields: Vec<String>) -> Self {
        self.config.history.identity_fields = fields;
        self
    }

    /// Set the migration ledger collection name.
    pub fn migrations_collection(mut self, name: impl Into<String>) -> Self {
        self.config.migrations.collection = name.into();
        self
    }

    /// Use a SQLite database at `path`.
    pub fn sqlite(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage.provider = StorageProvider::Sqlite;
        self.config.storage.path = path.into();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RewindConfig {
        self.config
    }
}
