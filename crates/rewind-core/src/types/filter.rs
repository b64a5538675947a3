//! Filter types for document queries.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::document::{Document, ID_FIELD};

/// Filter operator for field queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    /// Equal to.
    Eq(Value),
    /// Not equal to (also matches documents lacking the field).
    Ne(Value),
    /// Greater than.
    Gt(Value),
    /// Greater than or equal to.
    Gte(Value),
    /// Less than.
    Lt(Value),
    /// Less than or equal to.
    Lte(Value),
    /// In list.
    In(Vec<Value>),
    /// Not in list.
    Nin(Vec<Value>),
    /// Field is present.
    Exists,
    /// Field is absent.
    NotExists,
}

/// A single filter condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// Field name to filter on. Dots address nested objects.
    pub field: String,
    /// Operator to apply.
    pub operator: FilterOperator,
}

/// Composite filter with AND/OR/NOT logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// Single condition.
    Condition(FilterCondition),
    /// AND of multiple filters. Empty matches everything.
    And(Vec<Filter>),
    /// OR of multiple filters. Empty matches nothing.
    Or(Vec<Filter>),
    /// NOT of a filter.
    Not(Box<Filter>),
}

impl Filter {
    fn condition(field: impl Into<String>, operator: FilterOperator) -> Self {
        Filter::Condition(FilterCondition {
            field: field.into(),
            operator,
        })
    }

    /// Match every document.
    pub fn all() -> Self {
        Filter::And(Vec::new())
    }

    /// Match the document with the given id.
    pub fn id(id: impl Into<String>) -> Self {
        Self::eq(ID_FIELD, Value::String(id.into()))
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, FilterOperator::Eq(value.into()))
    }

    /// Create an inequality filter.
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, FilterOperator::Ne(value.into()))
    }

    /// Create a greater than filter.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, FilterOperator::Gt(value.into()))
    }

    /// Create a greater than or equal filter.
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, FilterOperator::Gte(value.into()))
    }

    /// Create a less than filter.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, FilterOperator::Lt(value.into()))
    }

    /// Create a less than or equal filter.
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, FilterOperator::Lte(value.into()))
    }

    /// Create an in-list filter.
    pub fn in_list(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::condition(field, FilterOperator::In(values))
    }

    /// Create a not-in-list filter.
    pub fn not_in_list(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::condition(field, FilterOperator::Nin(values))
    }

    /// Create an exists filter.
    pub fn exists(field: impl Into<String>) -> Self {
        Self::condition(field, FilterOperator::Exists)
    }

    /// Create a not-exists filter.
    pub fn not_exists(field: impl Into<String>) -> Self {
        Self::condition(field, FilterOperator::NotExists)
    }

    /// Create an AND filter.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    /// Create an OR filter.
    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    /// Create a NOT filter.
    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// Check whether a document matches this filter.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::Condition(cond) => cond.matches(doc),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(doc)),
            Filter::Not(filter) => !filter.matches(doc),
        }
    }
}

impl FilterCondition {
    /// Check whether a document matches this condition.
    pub fn matches(&self, doc: &Document) -> bool {
        let field_value = lookup(doc, &self.field);
        match &self.operator {
            FilterOperator::Eq(v) => field_value == Some(v),
            FilterOperator::Ne(v) => field_value != Some(v),
            FilterOperator::Gt(v) => {
                compare_values(field_value, v).map_or(false, |o| o == Ordering::Greater)
            }
            FilterOperator::Gte(v) => {
                compare_values(field_value, v).map_or(false, |o| o != Ordering::Less)
            }
            FilterOperator::Lt(v) => {
                compare_values(field_value, v).map_or(false, |o| o == Ordering::Less)
            }
            FilterOperator::Lte(v) => {
                compare_values(field_value, v).map_or(false, |o| o != Ordering::Greater)
            }
            FilterOperator::In(values) => field_value.map_or(false, |fv| values.contains(fv)),
            FilterOperator::Nin(values) => field_value.map_or(true, |fv| !values.contains(fv)),
            FilterOperator::Exists => field_value.is_some(),
            FilterOperator::NotExists => field_value.is_none(),
        }
    }
}

/// Resolve a possibly dotted field path inside a document.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Order two JSON values of the same kind. Mixed kinds are incomparable.
pub fn compare_values(field_value: Option<&Value>, compare_to: &Value) -> Option<Ordering> {
    match (field_value?, compare_to) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
