//! In-memory registry of migration definitions.

use std::collections::HashSet;

use crate::error::{RewindError, RewindResult};

use super::definition::MigrationDefinition;

/// Definitions in registration order. Names are unique.
#[derive(Debug, Default, Clone)]
pub struct MigrationRegistry {
    definitions: Vec<MigrationDefinition>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition. A second definition with the same name is rejected.
    pub fn register(&mut self, definition: MigrationDefinition) -> RewindResult<()> {
        if self.get(definition.name()).is_some() {
            return Err(RewindError::duplicate_name(definition.name()));
        }
        self.definitions.push(definition);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MigrationDefinition> {
        self.definitions.iter().find(|d| d.name() == name)
    }

    /// Definitions whose names are not in `applied`, ascending by version.
    /// Equal versions keep registration order.
    pub fn pending(&self, applied: &HashSet<String>) -> Vec<&MigrationDefinition> {
        let mut pending: Vec<&MigrationDefinition> = self
            .definitions
            .iter()
            .filter(|d| !applied.contains(d.name()))
            .collect();
        pending.sort_by_key(|d| d.version());
        pending
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
