//! Document store building blocks and the in-memory backend.

mod collection;
mod memory;

pub use collection::{Change, Collection};
pub use memory::MemoryStore;
