//! In-memory concept graph for one terminology snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use snomed_valueset::SctId;
use tracing::{debug, info, warn};

use crate::bitset::ConceptIdRegistry;
use crate::error::{HierarchyError, HierarchyResult, IntegrityViolation};
use crate::traits::HierarchySource;
use crate::types::{Concept, Relationship};

/// How to treat active IS-A edges that touch inactive concepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// Reject the snapshot.
    Strict,
    /// Drop the edge and log a warning.
    #[default]
    Lenient,
}

/// Graph loading options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Handling of active edges with an inactive endpoint.
    #[serde(default)]
    pub strictness: Strictness,
}

impl GraphConfig {
    /// Creates the default (lenient) configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the strictness.
    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }
}

/// Concepts and active IS-A edges of one snapshot, keyed by dense index.
///
/// Concept indices are assigned in ascending SCTID order, so two loads of
/// the same concept set produce the same layout. Adjacency lists are
/// sorted and free of duplicates.
pub struct ConceptGraph {
    registry: Arc<ConceptIdRegistry>,
    concepts: Vec<Concept>,
    parents: Vec<Vec<u32>>,
    children: Vec<Vec<u32>>,
    edge_count: usize,
    dropped_edges: usize,
}

impl ConceptGraph {
    /// Builds a graph from a full snapshot of concepts and relationships.
    ///
    /// Later duplicates of a concept id replace earlier ones. Only active
    /// IS-A relationships become edges.
    ///
    /// # Errors
    ///
    /// - [`HierarchyError::Integrity`] if an active IS-A edge references an
    ///   unknown concept, or touches an inactive one under
    ///   [`Strictness::Strict`]
    /// - [`HierarchyError::TooManyConcepts`] if the ids overflow u32 indexing
    pub fn load<C, R>(concepts: C, relationships: R, config: &GraphConfig) -> HierarchyResult<Self>
    where
        C: IntoIterator<Item = Concept>,
        R: IntoIterator<Item = Relationship>,
    {
        let by_id: BTreeMap<SctId, Concept> = concepts.into_iter().map(|c| (c.id, c)).collect();
        let registry = ConceptIdRegistry::from_concepts(by_id.keys().copied())?;
        let concepts: Vec<Concept> = by_id.into_values().collect();

        let n = concepts.len();
        let mut parents: Vec<Vec<u32>> = vec![Vec::new(); n];
        let mut children: Vec<Vec<u32>> = vec![Vec::new(); n];
        let mut dropped_edges = 0usize;

        for rel in relationships {
            if !rel.is_hierarchy_edge() {
                continue;
            }

            let source = registry.get_index(rel.source_id).ok_or(HierarchyError::Integrity {
                relationship: rel.id,
                violation: IntegrityViolation::MissingConcept(rel.source_id),
            })?;
            let destination = registry
                .get_index(rel.destination_id)
                .ok_or(HierarchyError::Integrity {
                    relationship: rel.id,
                    violation: IntegrityViolation::MissingConcept(rel.destination_id),
                })?;

            let inactive = [(source, rel.source_id), (destination, rel.destination_id)]
                .into_iter()
                .find(|&(idx, _)| !concepts[idx as usize].active);

            if let Some((_, concept_id)) = inactive {
                match config.strictness {
                    Strictness::Strict => {
                        return Err(HierarchyError::Integrity {
                            relationship: rel.id,
                            violation: IntegrityViolation::InactiveEndpoint(concept_id),
                        });
                    }
                    Strictness::Lenient => {
                        debug!(relationship = rel.id, concept = concept_id, "Dropping IS-A edge to inactive concept");
                        dropped_edges += 1;
                        continue;
                    }
                }
            }

            parents[source as usize].push(destination);
            children[destination as usize].push(source);
        }

        let mut edge_count = 0;
        for list in parents.iter_mut().chain(children.iter_mut()) {
            list.sort_unstable();
            list.dedup();
        }
        for list in &parents {
            edge_count += list.len();
        }

        if dropped_edges > 0 {
            warn!(dropped_edges, "Dropped active IS-A edges touching inactive concepts");
        }
        info!(concepts = n, edges = edge_count, "Loaded concept graph");

        Ok(Self {
            registry: Arc::new(registry),
            concepts,
            parents,
            children,
            edge_count,
            dropped_edges,
        })
    }

    /// Returns the shared id registry.
    pub fn registry(&self) -> &Arc<ConceptIdRegistry> {
        &self.registry
    }

    /// Returns the dense index of a concept.
    #[inline]
    pub fn index_of(&self, id: SctId) -> Option<u32> {
        self.registry.get_index(id)
    }

    /// Returns the concept id at a dense index.
    #[inline]
    pub fn id_of(&self, index: u32) -> Option<SctId> {
        self.registry.get_concept_id(index)
    }

    /// Direct parent indices of a concept index.
    #[inline]
    pub fn parent_indices(&self, index: u32) -> &[u32] {
        self.parents.get(index as usize).map_or(&[], Vec::as_slice)
    }

    /// Direct child indices of a concept index.
    #[inline]
    pub fn child_indices(&self, index: u32) -> &[u32] {
        self.children.get(index as usize).map_or(&[], Vec::as_slice)
    }

    /// Immediate parents of a concept, sorted by id.
    ///
    /// # Errors
    ///
    /// [`HierarchyError::NotFound`] if the concept is not in the snapshot.
    pub fn parents_of(&self, id: SctId) -> HierarchyResult<Vec<SctId>> {
        let index = self.index_of(id).ok_or(HierarchyError::NotFound(id))?;
        Ok(self.sorted_ids(self.parent_indices(index)))
    }

    /// Immediate children of a concept, sorted by id.
    ///
    /// # Errors
    ///
    /// [`HierarchyError::NotFound`] if the concept is not in the snapshot.
    pub fn children_of(&self, id: SctId) -> HierarchyResult<Vec<SctId>> {
        let index = self.index_of(id).ok_or(HierarchyError::NotFound(id))?;
        Ok(self.sorted_ids(self.child_indices(index)))
    }

    /// Returns true if the concept is in the snapshot.
    #[inline]
    pub fn contains(&self, id: SctId) -> bool {
        self.registry.contains(id)
    }

    /// Returns the concept record.
    pub fn concept(&self, id: SctId) -> Option<&Concept> {
        self.index_of(id).map(|idx| &self.concepts[idx as usize])
    }

    /// Returns true if the concept exists and is active.
    pub fn is_active(&self, id: SctId) -> bool {
        self.concept(id).is_some_and(|c| c.active)
    }

    /// Returns true if the concept at `index` is active.
    #[inline]
    pub fn is_active_index(&self, index: u32) -> bool {
        self.concepts.get(index as usize).is_some_and(|c| c.active)
    }

    /// Active concepts without parents.
    pub fn roots(&self) -> Vec<SctId> {
        self.concepts
            .iter()
            .enumerate()
            .filter(|(idx, c)| c.active && self.parents[*idx].is_empty())
            .map(|(_, c)| c.id)
            .collect()
    }

    /// Iterates over all concept records in index order.
    pub fn concepts(&self) -> impl Iterator<Item = &Concept> + '_ {
        self.concepts.iter()
    }

    /// Number of concepts, active or not.
    pub fn concept_count(&self) -> usize {
        self.concepts.len()
    }

    /// Number of distinct active IS-A edges.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Number of active IS-A edges dropped under lenient loading.
    pub fn dropped_edge_count(&self) -> usize {
        self.dropped_edges
    }

    fn sorted_ids(&self, indices: &[u32]) -> Vec<SctId> {
        let mut ids = self.registry.to_concept_ids(indices);
        ids.sort_unstable();
        ids
    }
}

impl HierarchySource for ConceptGraph {
    fn children(&self, concept_id: SctId) -> Vec<SctId> {
        self.children_of(concept_id).unwrap_or_default()
    }

    fn parents(&self, concept_id: SctId) -> Vec<SctId> {
        self.parents_of(concept_id).unwrap_or_default()
    }

    fn has_concept(&self, concept_id: SctId) -> bool {
        self.contains(concept_id)
    }

    fn all_concept_ids(&self) -> Box<dyn Iterator<Item = SctId> + '_> {
        Box::new(self.registry.concept_ids())
    }

    fn is_concept_active(&self, concept_id: SctId) -> bool {
        self.is_active(concept_id)
    }
}

impl std::fmt::Debug for ConceptGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConceptGraph")
            .field("concepts", &self.concept_count())
            .field("edges", &self.edge_count)
            .field("dropped_edges", &self.dropped_edges)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ```text
    ///        100
    ///       /   \
    ///     200   300
    ///       \   /
    ///        400
    /// ```
    fn diamond() -> (Vec<Concept>, Vec<Relationship>) {
        let concepts = [100, 200, 300, 400].map(Concept::new).to_vec();
        let relationships = vec![
            Relationship::is_a(1, 200, 100),
            Relationship::is_a(2, 300, 100),
            Relationship::is_a(3, 400, 200),
            Relationship::is_a(4, 400, 300),
        ];
        (concepts, relationships)
    }

    #[test]
    fn test_load_and_adjacency() {
        let (concepts, relationships) = diamond();
        let graph = ConceptGraph::load(concepts, relationships, &GraphConfig::default()).unwrap();

        assert_eq!(graph.concept_count(), 4);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.parents_of(400).unwrap(), vec![200, 300]);
        assert_eq!(graph.children_of(100).unwrap(), vec![200, 300]);
        assert!(graph.children_of(400).unwrap().is_empty());
        assert_eq!(graph.roots(), vec![100]);
    }

    #[test]
    fn test_unknown_concept_is_not_found() {
        let (concepts, relationships) = diamond();
        let graph = ConceptGraph::load(concepts, relationships, &GraphConfig::default()).unwrap();
        assert_eq!(graph.parents_of(999), Err(HierarchyError::NotFound(999)));
        assert_eq!(graph.children_of(999), Err(HierarchyError::NotFound(999)));
    }

    #[test]
    fn test_missing_endpoint_is_integrity_error() {
        let (concepts, mut relationships) = diamond();
        relationships.push(Relationship::is_a(9, 400, 555));

        let err = ConceptGraph::load(concepts, relationships, &GraphConfig::default()).unwrap_err();
        assert_eq!(
            err,
            HierarchyError::Integrity {
                relationship: 9,
                violation: IntegrityViolation::MissingConcept(555),
            }
        );
    }

    #[test]
    fn test_inactive_and_attribute_edges_ignored() {
        let (concepts, mut relationships) = diamond();
        let mut retired = Relationship::is_a(10, 100, 400);
        retired.active = false;
        relationships.push(retired);
        // Attribute edges may point anywhere
        relationships.push(Relationship {
            type_id: 363698007,
            ..Relationship::is_a(11, 200, 777)
        });

        let graph = ConceptGraph::load(concepts, relationships, &GraphConfig::default()).unwrap();
        assert_eq!(graph.edge_count(), 4);
        assert!(graph.parents_of(100).unwrap().is_empty());
    }

    #[test]
    fn test_inactive_endpoint_lenient_drops_edge() {
        let (mut concepts, mut relationships) = diamond();
        concepts.push(Concept::inactive(500));
        relationships.push(Relationship::is_a(12, 500, 100));

        let graph = ConceptGraph::load(concepts, relationships, &GraphConfig::default()).unwrap();
        assert_eq!(graph.dropped_edge_count(), 1);
        assert!(graph.parents_of(500).unwrap().is_empty());
        assert!(!graph.is_active(500));
        assert!(!graph.roots().contains(&500));
    }

    #[test]
    fn test_inactive_endpoint_strict_fails() {
        let (mut concepts, mut relationships) = diamond();
        concepts.push(Concept::inactive(500));
        relationships.push(Relationship::is_a(12, 400, 500));

        let config = GraphConfig::new().with_strictness(Strictness::Strict);
        let err = ConceptGraph::load(concepts, relationships, &config).unwrap_err();
        assert_eq!(
            err,
            HierarchyError::Integrity {
                relationship: 12,
                violation: IntegrityViolation::InactiveEndpoint(500),
            }
        );
    }

    #[test]
    fn test_duplicates_collapse() {
        let (mut concepts, mut relationships) = diamond();
        // Re-issued concept record: last one wins
        concepts.push(Concept::inactive(300));
        concepts.push(Concept::new(300));
        relationships.push(Relationship::is_a(13, 200, 100));

        let graph = ConceptGraph::load(concepts, relationships, &GraphConfig::default()).unwrap();
        assert_eq!(graph.concept_count(), 4);
        assert_eq!(graph.edge_count(), 4);
        assert!(graph.is_active(300));
    }

    #[test]
    fn test_index_layout_is_sorted() {
        let concepts = [300, 100, 200].map(Concept::new).to_vec();
        let graph = ConceptGraph::load(concepts, Vec::new(), &GraphConfig::default()).unwrap();
        assert_eq!(graph.index_of(100), Some(0));
        assert_eq!(graph.index_of(300), Some(2));
        assert_eq!(graph.id_of(1), Some(200));
    }

    #[test]
    fn test_strictness_serde() {
        let config: GraphConfig = serde_json::from_str(r#"{"strictness": "strict"}"#).unwrap();
        assert_eq!(config.strictness, Strictness::Strict);
        let config: GraphConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.strictness, Strictness::Lenient);
    }
}
