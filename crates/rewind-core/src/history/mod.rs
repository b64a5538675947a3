//! Document history for audit trails, point-in-time queries and reverts.
//!
//! Every create/update/delete of a tracked document appends an immutable
//! [`HistoryEntry`] with a gapless per-document version, enabling queries
//! like "what did this record contain at version 3?" and reversions that are
//! themselves recorded as new versions.

mod diff;
mod entry;
mod log;

pub use diff::detect_changes;
pub use entry::{ChangeSet, FieldChange, HistoryEntry, HistoryOperation, HistorySummary};
pub use log::{HistoryLog, HistoryQuery, HistoryQueryOptions};
