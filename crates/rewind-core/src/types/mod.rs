//! Core types for rewind.

mod document;
mod filter;
mod sort;
mod write;

pub use document::{
    canonical, document_id, from_value, without_fields, Document, DEFAULT_IDENTITY_FIELDS,
    ID_FIELD, REVISION_FIELD,
};
pub use filter::{compare_values, lookup, Filter, FilterCondition, FilterOperator};
pub use sort::{compare_documents, sort_documents, SortDirection, SortKey};
pub use write::{
    BulkWriteResult, DeleteResult, Patch, UpdateOptions, UpdateResult, WriteOp,
};
