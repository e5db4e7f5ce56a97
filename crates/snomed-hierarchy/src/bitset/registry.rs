//! Dense mapping between SCTIDs (u64) and compact indices (u32).

use std::collections::HashMap;

use snomed_valueset::SctId;

use crate::error::{HierarchyError, HierarchyResult};

/// Registry that maps between SctId (u64) and compact indices (u32).
///
/// SCTIDs are 64-bit and sparse; roaring bitmaps and adjacency arrays want
/// dense 32-bit indices. Indices are assigned in registration order, so a
/// registry built from a sorted id list gives every snapshot of the same
/// concept set the same layout.
///
/// The registry is frozen once a graph is loaded. Bitsets share it through
/// an `Arc`, and set operations refuse to mix bitsets from different
/// registries.
#[derive(Clone, Default)]
pub struct ConceptIdRegistry {
    id_to_index: HashMap<SctId, u32>,
    index_to_id: Vec<SctId>,
}

impl ConceptIdRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id_to_index: HashMap::with_capacity(capacity),
            index_to_id: Vec::with_capacity(capacity),
        }
    }

    /// Creates a registry from an iterator of concept IDs.
    ///
    /// Each unique concept ID is assigned a sequential index starting from 0.
    ///
    /// # Errors
    ///
    /// [`HierarchyError::TooManyConcepts`] if the ids do not fit a u32 index.
    pub fn from_concepts<I: IntoIterator<Item = SctId>>(concepts: I) -> HierarchyResult<Self> {
        let concepts = concepts.into_iter();
        let mut registry = Self::with_capacity(concepts.size_hint().0);
        for id in concepts {
            registry.register(id)?;
        }
        Ok(registry)
    }

    /// Registers a concept ID and returns its index.
    ///
    /// If the ID is already registered, returns the existing index.
    pub fn register(&mut self, id: SctId) -> HierarchyResult<u32> {
        if let Some(&idx) = self.id_to_index.get(&id) {
            return Ok(idx);
        }
        let idx = u32::try_from(self.index_to_id.len())
            .map_err(|_| HierarchyError::TooManyConcepts(self.index_to_id.len() + 1))?;
        self.id_to_index.insert(id, idx);
        self.index_to_id.push(id);
        Ok(idx)
    }

    /// Gets the compact index for a concept ID.
    #[inline]
    pub fn get_index(&self, id: SctId) -> Option<u32> {
        self.id_to_index.get(&id).copied()
    }

    /// Gets the concept ID for a compact index.
    #[inline]
    pub fn get_concept_id(&self, index: u32) -> Option<SctId> {
        self.index_to_id.get(index as usize).copied()
    }

    /// Returns the number of registered concepts.
    #[inline]
    pub fn len(&self) -> usize {
        self.index_to_id.len()
    }

    /// Returns true if the registry is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index_to_id.is_empty()
    }

    /// Returns true if the concept ID is registered.
    #[inline]
    pub fn contains(&self, id: SctId) -> bool {
        self.id_to_index.contains_key(&id)
    }

    /// Returns an iterator over all registered concept IDs in index order.
    pub fn concept_ids(&self) -> impl Iterator<Item = SctId> + '_ {
        self.index_to_id.iter().copied()
    }

    /// Converts indices back to concept IDs. Invalid indices are dropped.
    pub fn to_concept_ids(&self, indices: &[u32]) -> Vec<SctId> {
        indices
            .iter()
            .filter_map(|&idx| self.get_concept_id(idx))
            .collect()
    }

    /// Returns estimated memory usage in bytes.
    pub fn memory_size(&self) -> usize {
        let hashmap_size = self.id_to_index.capacity() * (8 + 4 + 8);
        let vec_size = self.index_to_id.capacity() * 8;
        hashmap_size + vec_size + std::mem::size_of::<Self>()
    }
}

impl std::fmt::Debug for ConceptIdRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConceptIdRegistry")
            .field("len", &self.len())
            .field("memory_size", &self.memory_size())
            .finish()
    }
}
