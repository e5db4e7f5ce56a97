//! Registry of valueset definitions.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use snomed_valueset::{load_catalog_json, ValuesetDefinition, ValuesetKey};
use tracing::{debug, info};

use crate::error::{ExpansionError, ExpansionResult};

/// Valueset definitions keyed by `(id, version)`.
///
/// Registering a definition under an existing key replaces it. Materialized
/// results carry the fingerprint they were built from, so the old member
/// set simply stops matching.
#[derive(Debug, Default)]
pub struct ValuesetCatalog {
    definitions: RwLock<BTreeMap<ValuesetKey, Arc<ValuesetDefinition>>>,
}

impl ValuesetCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a definition. Returns the replaced one.
    pub fn register(&self, definition: ValuesetDefinition) -> Option<Arc<ValuesetDefinition>> {
        let key = definition.key.clone();
        let previous = self.definitions.write().insert(key.clone(), Arc::new(definition));
        if previous.is_some() {
            debug!(valueset = %key, "Replaced valueset definition");
        }
        previous
    }

    /// Adds every definition, returning how many were new.
    pub fn extend<I: IntoIterator<Item = ValuesetDefinition>>(&self, definitions: I) -> usize {
        definitions
            .into_iter()
            .filter(|d| self.register(d.clone()).is_none())
            .count()
    }

    /// Looks up a definition.
    pub fn get(&self, id: &str, version: &str) -> Option<Arc<ValuesetDefinition>> {
        self.definitions.read().get(&ValuesetKey::new(id, version)).cloned()
    }

    /// Looks up a definition, failing with [`ExpansionError::UnknownValueset`].
    pub fn require(&self, id: &str, version: &str) -> ExpansionResult<Arc<ValuesetDefinition>> {
        self.get(id, version)
            .ok_or_else(|| ExpansionError::UnknownValueset(ValuesetKey::new(id, version)))
    }

    /// Removes a definition.
    pub fn remove(&self, id: &str, version: &str) -> Option<Arc<ValuesetDefinition>> {
        self.definitions.write().remove(&ValuesetKey::new(id, version))
    }

    /// All definitions, ordered by key.
    pub fn definitions(&self) -> Vec<Arc<ValuesetDefinition>> {
        self.definitions.read().values().cloned().collect()
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.definitions.read().len()
    }

    /// Returns true if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }

    /// Loads definitions from a JSON catalog file.
    pub fn load_json_file<P: AsRef<Path>>(&self, path: P) -> ExpansionResult<usize> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ExpansionError::io_error(path, e))?;
        let definitions = load_catalog_json(&json)?;
        let total = definitions.len();
        let added = self.extend(definitions);
        info!(path = %path.display(), total, added, "Loaded valueset catalog");
        Ok(total)
    }
}
