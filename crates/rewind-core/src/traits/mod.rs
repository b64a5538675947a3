//! Core traits for rewind.

mod document_store;

pub use document_store::DocumentStore;

#[cfg(test)]
pub use document_store::MockDocumentStore;
