//! Migration definitions.
//!
//! A [`MigrationDefinition`] is validated when it is built, so a malformed
//! definition is rejected at registration time instead of failing halfway
//! through a run.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{RewindError, RewindResult};
use crate::traits::DocumentStore;

use super::fields::FieldHelper;

/// Direction a migration operation runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MigrationDirection {
    /// Forward operation.
    Apply,
    /// Backward operation.
    Revert,
}

/// Handle passed to migration operations.
#[derive(Clone)]
pub struct MigrationContext {
    store: Arc<dyn DocumentStore>,
}

impl MigrationContext {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// The store the migration runs against.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Bulk field helpers for one collection.
    pub fn fields(&self, collection: impl Into<String>) -> FieldHelper {
        FieldHelper::new(Arc::clone(&self.store), collection)
    }
}

/// A forward or backward migration operation.
pub type MigrationFn =
    Arc<dyn Fn(MigrationContext) -> BoxFuture<'static, RewindResult<()>> + Send + Sync>;

fn boxed<F, Fut>(f: F) -> MigrationFn
where
    F: Fn(MigrationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RewindResult<()>> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// A named, versioned migration held in memory.
#[derive(Clone)]
pub struct MigrationDefinition {
    name: String,
    version: i64,
    description: String,
    apply: MigrationFn,
    revert: Option<MigrationFn>,
}

impl MigrationDefinition {
    /// Start building a definition.
    pub fn builder(name: impl Into<String>, version: i64) -> MigrationDefinitionBuilder {
        MigrationDefinitionBuilder {
            name: name.into(),
            version,
            description: String::new(),
            apply: None,
            revert: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether the migration can be rolled back.
    pub fn is_reversible(&self) -> bool {
        self.revert.is_some()
    }

    pub(crate) async fn run_apply(&self, ctx: MigrationContext) -> RewindResult<()> {
        (self.apply)(ctx).await
    }

    pub(crate) async fn run_revert(&self, ctx: MigrationContext) -> RewindResult<()> {
        match &self.revert {
            Some(revert) => revert(ctx).await,
            None => Err(RewindError::not_reversible(&self.name)),
        }
    }
}

impl fmt::Debug for MigrationDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationDefinition")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("description", &self.description)
            .field("reversible", &self.is_reversible())
            .finish()
    }
}

/// Builder for [`MigrationDefinition`].
pub struct MigrationDefinitionBuilder {
    name: String,
    version: i64,
    description: String,
    apply: Option<MigrationFn>,
    revert: Option<MigrationFn>,
}

impl MigrationDefinitionBuilder {
    /// Set the human-readable description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the forward operation (required).
    pub fn apply<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(MigrationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RewindResult<()>> + Send + 'static,
    {
        self.apply = Some(boxed(f));
        self
    }

    /// Set the backward operation. Without one the migration cannot be rolled back.
    pub fn revert<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(MigrationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RewindResult<()>> + Send + 'static,
    {
        self.revert = Some(boxed(f));
        self
    }

    /// Validate and build the definition.
    pub fn build(self) -> RewindResult<MigrationDefinition> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(RewindError::invalid_definition(
                "migration name must not be empty",
                None,
            ));
        }
        let apply = self.apply.ok_or_else(|| {
            RewindError::invalid_definition(
                format!("migration '{}' has no apply operation", name),
                Some(name.clone()),
            )
        })?;

        Ok(MigrationDefinition {
            name,
            version: self.version,
            description: self.description,
            apply,
            revert: self.revert,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ctx() -> MigrationContext {
        MigrationContext::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_build_requires_name_and_apply() {
        let err = MigrationDefinition::builder("  ", 1)
            .apply(|_| async { Ok(()) })
            .build()
            .unwrap_err();
        assert!(matches!(err, RewindError::InvalidDefinition { migration: None, .. }));

        let err = MigrationDefinition::builder("addStatus", 1)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            RewindError::InvalidDefinition { migration: Some(ref n), .. } if n == "addStatus"
        ));
    }

    #[tokio::test]
    async fn test_revert_absent_is_not_reversible() {
        let def = MigrationDefinition::builder("oneWay", 1)
            .description("cannot go back")
            .apply(|_| async { Ok(()) })
            .build()
            .unwrap();

        assert!(!def.is_reversible());
        assert!(def.run_apply(ctx()).await.is_ok());
        let err = def.run_revert(ctx()).await.unwrap_err();
        assert!(matches!(err, RewindError::NotReversible { .. }));
        assert!(format!("{:?}", def).contains("oneWay"));
    }

    #[test]
    fn test_direction_strings() {
        assert_eq!(MigrationDirection::Apply.to_string(), "apply");
        assert_eq!(MigrationDirection::Revert.to_string(), "revert");
    }
}
