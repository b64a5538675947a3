//! Migration runner: applies pending migrations and rolls them back.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::MigrationConfig;
use crate::error::{RewindError, RewindResult};
use crate::traits::DocumentStore;

use super::definition::{MigrationContext, MigrationDefinition, MigrationDirection};
use super::fields::FieldHelper;
use super::ledger::MigrationLedger;
use super::record::{
    ApplyOptions, ApplyOutcome, ApplySummary, MigrationRecord, MigrationResult, MigrationStatus,
    PendingMigration, RollbackOutcome, RollbackResult, RollbackSummary,
};
use super::registry::MigrationRegistry;

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Runs registered migrations against a store and keeps the ledger current.
///
/// Migrations run strictly one at a time, ascending by version when applying
/// and descending when rolling back. Nothing is retried.
pub struct MigrationRunner {
    store: Arc<dyn DocumentStore>,
    registry: MigrationRegistry,
    ledger: MigrationLedger,
}

impl MigrationRunner {
    pub fn new(store: Arc<dyn DocumentStore>, config: MigrationConfig) -> Self {
        let ledger = MigrationLedger::new(Arc::clone(&store), config.collection);
        Self {
            store,
            registry: MigrationRegistry::new(),
            ledger,
        }
    }

    pub fn with_defaults(store: Arc<dyn DocumentStore>) -> Self {
        Self::new(store, MigrationConfig::default())
    }

    /// Register a migration definition.
    pub fn register(&mut self, definition: MigrationDefinition) -> RewindResult<()> {
        debug!(
            migration = %definition.name(),
            version = definition.version(),
            "Registered migration"
        );
        self.registry.register(definition)
    }

    pub fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &MigrationLedger {
        &self.ledger
    }

    /// Field helpers for one collection of the runner's store.
    pub fn field_helper(&self, collection: impl Into<String>) -> FieldHelper {
        FieldHelper::new(Arc::clone(&self.store), collection)
    }

    fn context(&self) -> MigrationContext {
        MigrationContext::new(Arc::clone(&self.store))
    }

    async fn applied_names(&self) -> RewindResult<HashSet<String>> {
        Ok(self
            .ledger
            .list()
            .await?
            .into_iter()
            .map(|record| record.name)
            .collect())
    }

    /// Apply every pending migration in version order.
    ///
    /// With `continue_on_error` unset the first failure stops the run and is
    /// returned as [`RewindError::MigrationFailed`] carrying the results so far
    /// (see [`RewindError::summary`]); migrations applied before it stay recorded.
    pub async fn apply_migrations(&self, options: ApplyOptions) -> RewindResult<ApplyOutcome> {
        self.ledger.ensure_indexes().await?;

        let applied = self.applied_names().await?;
        let pending = self.registry.pending(&applied);
        if pending.is_empty() {
            debug!("No pending migrations");
            return Ok(ApplyOutcome::NothingToApply);
        }

        info!(count = pending.len(), "Applying pending migrations");
        let mut summary = ApplySummary::default();

        for def in pending {
            let start = Instant::now();
            match def.run_apply(self.context()).await {
                Ok(()) => {
                    let duration_ms = elapsed_ms(start);
                    let record = MigrationRecord {
                        name: def.name().to_string(),
                        version: def.version(),
                        description: def.description().to_string(),
                        applied_at: Utc::now(),
                        duration_ms,
                    };
                    self.ledger.insert(&record).await.map_err(|e| {
                        if e.is_duplicate_key() {
                            RewindError::duplicate_name(def.name())
                        } else {
                            e
                        }
                    })?;

                    info!(
                        migration = %def.name(),
                        version = def.version(),
                        duration_ms,
                        "Applied migration"
                    );
                    summary.applied += 1;
                    summary.results.push(MigrationResult::succeeded(def, duration_ms));
                }
                Err(e) => {
                    error!(
                        migration = %def.name(),
                        version = def.version(),
                        error = %e,
                        "Migration failed"
                    );
                    summary.failed += 1;
                    summary.results.push(MigrationResult::failed(def, &e));

                    if !options.continue_on_error {
                        return Err(RewindError::migration_failed(
                            def.name(),
                            def.version(),
                            MigrationDirection::Apply,
                            e,
                        )
                        .with_summary(summary));
                    }
                }
            }
        }

        if summary.failed > 0 {
            warn!(
                applied = summary.applied,
                failed = summary.failed,
                "Migrations completed with failures"
            );
        }
        Ok(ApplyOutcome::Completed(summary))
    }

    /// Roll back the most recently applied migration.
    pub async fn rollback_last_migration(&self) -> RewindResult<RollbackOutcome> {
        let records = self.ledger.list().await?;
        let last = records
            .into_iter()
            .max_by(|a, b| {
                a.applied_at
                    .cmp(&b.applied_at)
                    .then(a.version.cmp(&b.version))
            });

        match last {
            None => {
                debug!("Nothing to roll back");
                Ok(RollbackOutcome::NothingToRollback)
            }
            Some(record) => Ok(RollbackOutcome::RolledBack(self.rollback(&record).await?)),
        }
    }

    /// Roll back every applied migration above `target`, highest version first.
    ///
    /// Stops at the first failure; migrations already rolled back stay rolled back.
    pub async fn rollback_to_version(&self, target: i64) -> RewindResult<RollbackSummary> {
        let mut records: Vec<MigrationRecord> = self
            .ledger
            .list()
            .await?
            .into_iter()
            .filter(|record| record.version > target)
            .collect();
        records.sort_by(|a, b| {
            b.version
                .cmp(&a.version)
                .then(b.applied_at.cmp(&a.applied_at))
        });

        info!(target_version = target, count = records.len(), "Rolling back migrations");
        let mut summary = RollbackSummary::default();
        for record in &records {
            summary.rolled_back.push(self.rollback(record).await?);
        }
        Ok(summary)
    }

    async fn rollback(&self, record: &MigrationRecord) -> RewindResult<RollbackResult> {
        let def = self
            .registry
            .get(&record.name)
            .ok_or_else(|| RewindError::unknown_migration(&record.name))?;
        if !def.is_reversible() {
            return Err(RewindError::not_reversible(def.name()));
        }

        let start = Instant::now();
        if let Err(e) = def.run_revert(self.context()).await {
            error!(
                migration = %def.name(),
                version = def.version(),
                error = %e,
                "Rollback failed"
            );
            return Err(RewindError::migration_failed(
                def.name(),
                def.version(),
                MigrationDirection::Revert,
                e,
            ));
        }
        if !self.ledger.remove(&record.name).await? {
            warn!(migration = %def.name(), "Ledger record was already removed");
        }

        let duration_ms = elapsed_ms(start);
        info!(
            migration = %def.name(),
            version = record.version,
            duration_ms,
            "Rolled back migration"
        );
        Ok(RollbackResult {
            name: record.name.clone(),
            version: record.version,
            duration_ms,
        })
    }

    /// Applied migrations from the ledger and registered ones still pending.
    pub async fn get_migration_status(&self) -> RewindResult<MigrationStatus> {
        let applied = self.ledger.list().await?;
        let names: HashSet<String> = applied.iter().map(|r| r.name.clone()).collect();
        let pending = self
            .registry
            .pending(&names)
            .into_iter()
            .map(PendingMigration::from)
            .collect();
        Ok(MigrationStatus { applied, pending })
    }
}
