//! Roaring bitmap concept sets.
//!
//! Closure rows and materialized valuesets are stored as [`ConceptBitSet`]s:
//! a [`RoaringBitmap`] over dense indices plus the shared
//! [`ConceptIdRegistry`] that translates them back to SCTIDs.
//!
//! # Example
//!
//! ```ignore
//! use snomed_hierarchy::ConceptBitSet;
//!
//! let diabetes = closure.descendants_or_self(73211009)?;
//! let renal = closure.descendants_or_self(90708001)?;
//!
//! let diabetic_renal = diabetes.intersection(&renal);   // AND
//! let either = diabetes.union(&renal);                  // OR
//! let plain = diabetes.difference(&renal);              // MINUS
//! ```

mod registry;

pub use registry::ConceptIdRegistry;

use std::io;
use std::sync::Arc;

use roaring::RoaringBitmap;
use snomed_valueset::SctId;

/// A set of concepts stored as a Roaring Bitmap.
///
/// Bitmaps hold u32 indices, so every set carries the
/// [`ConceptIdRegistry`] of the snapshot it was built from.
#[derive(Clone)]
pub struct ConceptBitSet {
    bitmap: RoaringBitmap,
    registry: Arc<ConceptIdRegistry>,
}

impl ConceptBitSet {
    /// Creates a new empty bitset.
    pub fn new(registry: Arc<ConceptIdRegistry>) -> Self {
        Self {
            bitmap: RoaringBitmap::new(),
            registry,
        }
    }

    /// Wraps an index bitmap built against `registry`.
    pub fn from_bitmap(bitmap: RoaringBitmap, registry: Arc<ConceptIdRegistry>) -> Self {
        Self { bitmap, registry }
    }

    /// Creates a bitset from concept IDs. Unregistered IDs are ignored.
    pub fn from_ids<I: IntoIterator<Item = SctId>>(ids: I, registry: Arc<ConceptIdRegistry>) -> Self {
        let bitmap = ids
            .into_iter()
            .filter_map(|id| registry.get_index(id))
            .collect();
        Self { bitmap, registry }
    }

    /// Returns a reference to the underlying registry.
    pub fn registry(&self) -> &Arc<ConceptIdRegistry> {
        &self.registry
    }

    /// Inserts a concept. Returns `false` if it was present or unregistered.
    pub fn insert(&mut self, concept_id: SctId) -> bool {
        match self.registry.get_index(concept_id) {
            Some(idx) => self.bitmap.insert(idx),
            None => false,
        }
    }

    /// Removes a concept. Returns `true` if it was present.
    pub fn remove(&mut self, concept_id: SctId) -> bool {
        match self.registry.get_index(concept_id) {
            Some(idx) => self.bitmap.remove(idx),
            None => false,
        }
    }

    /// Checks if a concept is in the set.
    #[inline]
    pub fn contains(&self, concept_id: SctId) -> bool {
        self.registry
            .get_index(concept_id)
            .is_some_and(|idx| self.bitmap.contains(idx))
    }

    /// Checks membership by dense index.
    #[inline]
    pub fn contains_index(&self, index: u32) -> bool {
        self.bitmap.contains(index)
    }

    /// Returns the number of concepts in the set.
    #[inline]
    pub fn len(&self) -> usize {
        self.bitmap.len() as usize
    }

    /// Returns true if the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }

    /// Computes intersection (AND).
    ///
    /// # Panics
    ///
    /// Panics if the two bitsets use different registries.
    pub fn intersection(&self, other: &Self) -> Self {
        self.assert_same_registry(other, "intersect");
        Self {
            bitmap: &self.bitmap & &other.bitmap,
            registry: self.registry.clone(),
        }
    }

    /// Computes union (OR).
    ///
    /// # Panics
    ///
    /// Panics if the two bitsets use different registries.
    pub fn union(&self, other: &Self) -> Self {
        self.assert_same_registry(other, "union");
        Self {
            bitmap: &self.bitmap | &other.bitmap,
            registry: self.registry.clone(),
        }
    }

    /// Computes difference (MINUS).
    ///
    /// # Panics
    ///
    /// Panics if the two bitsets use different registries.
    pub fn difference(&self, other: &Self) -> Self {
        self.assert_same_registry(other, "difference");
        Self {
            bitmap: &self.bitmap - &other.bitmap,
            registry: self.registry.clone(),
        }
    }

    /// Computes union in-place.
    ///
    /// # Panics
    ///
    /// Panics if the two bitsets use different registries.
    pub fn or_inplace(&mut self, other: &Self) {
        self.assert_same_registry(other, "union");
        self.bitmap |= &other.bitmap;
    }

    /// Keeps only the members accepted by `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(SctId) -> bool) {
        let registry = &self.registry;
        let dropped: RoaringBitmap = self
            .bitmap
            .iter()
            .filter(|&idx| !registry.get_concept_id(idx).is_some_and(&mut keep))
            .collect();
        self.bitmap -= dropped;
    }

    /// Returns an iterator over concept IDs in index order.
    pub fn iter(&self) -> impl Iterator<Item = SctId> + '_ {
        self.bitmap
            .iter()
            .filter_map(|idx| self.registry.get_concept_id(idx))
    }

    /// Returns the members as a sorted list of SCTIDs.
    pub fn to_sorted_ids(&self) -> Vec<SctId> {
        let mut ids: Vec<SctId> = self.iter().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the serialized size in bytes.
    pub fn serialized_size(&self) -> usize {
        self.bitmap.serialized_size()
    }

    /// Returns approximate memory usage in bytes.
    pub fn memory_size(&self) -> usize {
        self.serialized_size() + std::mem::size_of::<Self>()
    }

    /// Serializes the bitmap in the portable roaring format.
    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        self.bitmap.serialize_into(&mut buf)?;
        Ok(buf)
    }

    /// Deserializes a bitmap written by [`serialize`](Self::serialize).
    pub fn deserialize(bytes: &[u8], registry: Arc<ConceptIdRegistry>) -> io::Result<Self> {
        let bitmap = RoaringBitmap::deserialize_from(bytes)?;
        Ok(Self { bitmap, registry })
    }

    /// Returns a reference to the underlying bitmap.
    pub fn as_bitmap(&self) -> &RoaringBitmap {
        &self.bitmap
    }

    fn assert_same_registry(&self, other: &Self, op: &str) {
        assert!(
            Arc::ptr_eq(&self.registry, &other.registry),
            "Cannot {} bitsets with different registries",
            op
        );
    }
}

impl PartialEq for ConceptBitSet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.registry, &other.registry) && self.bitmap == other.bitmap
    }
}

impl std::fmt::Debug for ConceptBitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConceptBitSet")
            .field("len", &self.len())
            .field("serialized_size", &self.serialized_size())
            .finish()
    }
}
