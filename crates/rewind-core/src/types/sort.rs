//! Sort specification for document queries.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::Document;
use super::filter::{compare_values, lookup};

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One sort key; several keys sort lexicographically in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Compare two documents by a list of sort keys.
///
/// Missing fields sort before present ones; values of different kinds are
/// treated as equal so the sort stays stable.
pub fn compare_documents(a: &Document, b: &Document, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let ordering = match (lookup(a, &key.field), lookup(b, &key.field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(left), Some(right)) => compare_present(left, right),
        };
        let ordering = match key.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_present(left: &Value, right: &Value) -> Ordering {
    compare_values(Some(left), right).unwrap_or(Ordering::Equal)
}

/// Sort documents in place (stable).
pub fn sort_documents(docs: &mut [Document], sort: &[SortKey]) {
    if !sort.is_empty() {
        docs.sort_by(|a, b| compare_documents(a, b, sort));
    }
}
