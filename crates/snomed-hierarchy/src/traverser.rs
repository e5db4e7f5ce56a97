//! Live hierarchy traversal.
//!
//! Used where no precomputed closure answers the question, e.g. descendant
//! queries against a closure built without descendant sets.

use std::collections::{HashSet, VecDeque};

use snomed_valueset::SctId;

use crate::traits::HierarchySource;

/// Traverses concept hierarchies using BFS.
///
/// # Example
///
/// ```ignore
/// use snomed_hierarchy::HierarchyTraverser;
///
/// let traverser = HierarchyTraverser::new(&graph);
/// let descendants = traverser.descendants(73211009);
/// ```
pub struct HierarchyTraverser<'a> {
    store: &'a dyn HierarchySource,
}

impl<'a> HierarchyTraverser<'a> {
    /// Creates a traverser over the given store.
    pub fn new(store: &'a dyn HierarchySource) -> Self {
        Self { store }
    }

    /// All concepts reachable through child links. Excludes the concept itself.
    pub fn descendants(&self, concept_id: SctId) -> HashSet<SctId> {
        self.walk(concept_id, |id| self.store.children(id))
    }

    /// Descendants plus the concept itself.
    pub fn descendants_or_self(&self, concept_id: SctId) -> HashSet<SctId> {
        let mut result = self.descendants(concept_id);
        result.insert(concept_id);
        result
    }

    /// All concepts reachable through parent links. Excludes the concept itself.
    pub fn ancestors(&self, concept_id: SctId) -> HashSet<SctId> {
        self.walk(concept_id, |id| self.store.parents(id))
    }

    /// Ancestors plus the concept itself.
    pub fn ancestors_or_self(&self, concept_id: SctId) -> HashSet<SctId> {
        let mut result = self.ancestors(concept_id);
        result.insert(concept_id);
        result
    }

    /// Returns true if `ancestor` is reachable upward from `descendant`.
    pub fn is_ancestor_of(&self, ancestor: SctId, descendant: SctId) -> bool {
        ancestor != descendant && self.ancestors(descendant).contains(&ancestor)
    }

    fn walk<F>(&self, start: SctId, next: F) -> HashSet<SctId>
    where
        F: Fn(SctId) -> Vec<SctId>,
    {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            for neighbour in next(current) {
                // A cycle back to the start must not make it its own relative
                if neighbour != start && visited.insert(neighbour) {
                    queue.push_back(neighbour);
                }
            }
        }

        visited
    }
}
