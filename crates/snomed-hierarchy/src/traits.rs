//! Adjacency seam for hierarchy traversal.
//!
//! [`HierarchySource`] is what live traversal needs from a store: one-hop
//! IS-A neighbours and existence checks. [`ConceptGraph`](crate::ConceptGraph)
//! implements it; tests and alternate backends can supply their own.

use snomed_valueset::SctId;

/// A store that exposes direct IS-A neighbours.
pub trait HierarchySource: Send + Sync {
    /// Gets direct children of a concept.
    ///
    /// Returns an empty Vec if the concept has no children or doesn't exist.
    fn children(&self, concept_id: SctId) -> Vec<SctId>;

    /// Gets direct parents of a concept.
    ///
    /// Returns an empty Vec if the concept has no parents or doesn't exist.
    fn parents(&self, concept_id: SctId) -> Vec<SctId>;

    /// Checks if a concept exists in the store.
    fn has_concept(&self, concept_id: SctId) -> bool;

    /// Returns an iterator over all concept IDs in the store.
    fn all_concept_ids(&self) -> Box<dyn Iterator<Item = SctId> + '_>;

    /// Returns whether the concept is active. Defaults to existence.
    fn is_concept_active(&self, concept_id: SctId) -> bool {
        self.has_concept(concept_id)
    }
}
