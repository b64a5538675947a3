//! Shallow structural diff between two document states.

use crate::types::{canonical, Document};

use super::entry::{ChangeSet, FieldChange};

/// Compute per-field changes from `old` to `new`.
///
/// Only top-level fields are compared, by their canonical serialized form. A
/// field missing from `new` is reported with `to` absent. Fields listed in
/// `ignored` never appear in the result.
pub fn detect_changes(old: &Document, new: &Document, ignored: &[String]) -> ChangeSet {
    let is_ignored = |field: &str| ignored.iter().any(|f| f == field);
    let mut changes = ChangeSet::new();

    for (field, value) in new {
        if is_ignored(field) {
            continue;
        }
        let differs = match old.get(field) {
            Some(previous) => canonical(previous) != canonical(value),
            None => true,
        };
        if differs {
            changes.insert(
                field.clone(),
                FieldChange::new(old.get(field).cloned(), Some(value.clone())),
            );
        }
    }

    for (field, value) in old {
        if is_ignored(field) || new.contains_key(field) {
            continue;
        }
        changes.insert(field.clone(), FieldChange::new(Some(value.clone()), None));
    }

    changes
}
