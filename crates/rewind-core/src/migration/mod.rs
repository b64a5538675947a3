//! Versioned, reversible data migrations.
//!
//! Definitions are registered with a [`MigrationRunner`], which applies the
//! pending ones in version order and records each success in a persisted
//! ledger. The ledger is authoritative: a migration it names is never run
//! again, and rolling back removes its record.
//!
//! ```ignore
//! let mut runner = MigrationRunner::with_defaults(store);
//! runner.register(
//!     MigrationDefinition::builder("addStatus", 1)
//!         .description("Add status to users")
//!         .apply(|ctx| async move {
//!             ctx.fields("users").add_field("status", "active").await?;
//!             Ok(())
//!         })
//!         .revert(|ctx| async move {
//!             ctx.fields("users").remove_field("status").await?;
//!             Ok(())
//!         })
//!         .build()?,
//! )?;
//! runner.apply_migrations(ApplyOptions::default()).await?;
//! ```

mod definition;
mod fields;
mod ledger;
mod record;
mod registry;
mod runner;

pub use definition::{
    MigrationContext, MigrationDefinition, MigrationDefinitionBuilder, MigrationDirection,
    MigrationFn,
};
pub use fields::FieldHelper;
pub use ledger::MigrationLedger;
pub use record::{
    ApplyOptions, ApplyOutcome, ApplySummary, MigrationRecord, MigrationResult, MigrationStatus,
    PendingMigration, RollbackOutcome, RollbackResult, RollbackSummary,
};
pub use registry::MigrationRegistry;
pub use runner::MigrationRunner;
