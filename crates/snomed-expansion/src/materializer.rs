//! Valueset materialization.
//!
//! Turns an intensional [`ValuesetDefinition`] into an extensional member set
//! by evaluating its rule against one snapshot's closure table. Composite
//! rules are evaluated as written: the parser already fixed left-to-right
//! association and explicit grouping, so evaluation is a plain tree walk.

use std::time::Instant;

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use snomed_hierarchy::{ClosureTable, ConceptBitSet, ConceptGraph, HierarchyTraverser, SctId};
use snomed_valueset::{ConceptRef, Fingerprint, RuleExpr, ValuesetDefinition, ValuesetKey};
use tracing::{debug, warn};

use crate::error::{ExpansionError, ExpansionResult};
use crate::snapshot::{Snapshot, SnapshotVersion};

/// What to do when a rule references a concept missing from the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownConceptPolicy {
    /// Fail the whole valueset with [`ExpansionError::UnknownConcept`].
    #[default]
    Fail,
    /// Treat the offending rule as empty and report the concept in
    /// [`MaterializedValueset::skipped`].
    Skip,
}

/// Materialization options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializeConfig {
    /// Unknown concept handling.
    pub unknown_concepts: UnknownConceptPolicy,
    /// Keep inactive concepts in results.
    pub include_inactive: bool,
}

impl MaterializeConfig {
    /// Sets the unknown concept policy.
    pub fn with_unknown_concepts(mut self, policy: UnknownConceptPolicy) -> Self {
        self.unknown_concepts = policy;
        self
    }

    /// Sets whether inactive concepts are kept.
    pub fn with_inactive(mut self, include: bool) -> Self {
        self.include_inactive = include;
        self
    }
}

/// The resolved member set of one valueset definition at one snapshot.
#[derive(Debug, Clone)]
pub struct MaterializedValueset {
    /// Definition identity.
    pub key: ValuesetKey,
    /// Fingerprint of the definition this was built from.
    pub fingerprint: Fingerprint,
    /// Snapshot the members were computed against.
    pub snapshot: SnapshotVersion,
    /// Member concepts.
    pub members: ConceptBitSet,
    /// Concepts skipped under [`UnknownConceptPolicy::Skip`], sorted.
    pub skipped: Vec<SctId>,
    /// Policy that applied.
    pub policy: UnknownConceptPolicy,
    /// Materialization time in milliseconds.
    pub built_in_ms: u64,
}

impl MaterializedValueset {
    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if there are no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Membership test.
    pub fn contains(&self, concept_id: SctId) -> bool {
        self.members.contains(concept_id)
    }

    /// Members sorted by SCTID.
    pub fn to_sorted_ids(&self) -> Vec<SctId> {
        self.members.to_sorted_ids()
    }
}

/// Evaluates valueset rules against one snapshot.
pub struct Materializer<'s> {
    graph: &'s ConceptGraph,
    closure: &'s ClosureTable,
    version: &'s SnapshotVersion,
    config: &'s MaterializeConfig,
}

impl<'s> Materializer<'s> {
    /// Creates a materializer bound to a snapshot.
    pub fn new(snapshot: &'s Snapshot, config: &'s MaterializeConfig) -> Self {
        Self {
            graph: snapshot.graph(),
            closure: snapshot.closure(),
            version: snapshot.version(),
            config,
        }
    }

    /// Resolves a definition into its member set.
    ///
    /// Identical definitions against the same snapshot always produce
    /// identical member sets.
    ///
    /// # Errors
    ///
    /// [`ExpansionError::UnknownConcept`] under [`UnknownConceptPolicy::Fail`].
    pub fn materialize(&self, definition: &ValuesetDefinition) -> ExpansionResult<MaterializedValueset> {
        let start = Instant::now();
        let mut eval = Evaluation {
            materializer: self,
            key: &definition.key,
            skipped: Vec::new(),
        };

        let mut bitmap = eval.evaluate(definition.rule())?;
        let mut skipped = eval.skipped;
        skipped.sort_unstable();
        skipped.dedup();

        if !self.config.include_inactive {
            bitmap = bitmap
                .iter()
                .filter(|&idx| self.graph.is_active_index(idx))
                .collect();
        }

        let members = ConceptBitSet::from_bitmap(bitmap, self.graph.registry().clone());
        let built_in_ms = start.elapsed().as_millis() as u64;
        debug!(
            valueset = %definition.key,
            members = members.len(),
            skipped = skipped.len(),
            built_in_ms,
            "Materialized valueset"
        );

        Ok(MaterializedValueset {
            key: definition.key.clone(),
            fingerprint: definition.fingerprint(),
            snapshot: self.version.clone(),
            members,
            skipped,
            policy: self.config.unknown_concepts,
            built_in_ms,
        })
    }
}

struct Evaluation<'m, 's> {
    materializer: &'m Materializer<'s>,
    key: &'m ValuesetKey,
    skipped: Vec<SctId>,
}

impl Evaluation<'_, '_> {
    fn evaluate(&mut self, rule: &RuleExpr) -> ExpansionResult<RoaringBitmap> {
        let graph = self.materializer.graph;
        let closure = self.materializer.closure;

        Ok(match rule {
            RuleExpr::Concept(c) => match self.resolve(c)? {
                Some(idx) => RoaringBitmap::from_iter([idx]),
                None => RoaringBitmap::new(),
            },
            RuleExpr::DescendantOrSelfOf(c) => match self.resolve(c)? {
                Some(idx) => {
                    let mut row = self.descendants(idx);
                    row.insert(idx);
                    row
                }
                None => RoaringBitmap::new(),
            },
            RuleExpr::DescendantOf(c) => match self.resolve(c)? {
                Some(idx) => self.descendants(idx),
                None => RoaringBitmap::new(),
            },
            RuleExpr::ChildOf(c) => match self.resolve(c)? {
                Some(idx) => graph.child_indices(idx).iter().copied().collect(),
                None => RoaringBitmap::new(),
            },
            RuleExpr::AncestorOrSelfOf(c) => match self.resolve(c)? {
                Some(idx) => {
                    let mut row = closure.ancestor_row(idx).cloned().unwrap_or_default();
                    row.insert(idx);
                    row
                }
                None => RoaringBitmap::new(),
            },
            RuleExpr::AncestorOf(c) => match self.resolve(c)? {
                Some(idx) => closure.ancestor_row(idx).cloned().unwrap_or_default(),
                None => RoaringBitmap::new(),
            },
            RuleExpr::Any => {
                let mut all = RoaringBitmap::new();
                all.insert_range(0..graph.concept_count() as u32);
                all
            }
            RuleExpr::Union(operands) => {
                let mut members = RoaringBitmap::new();
                for operand in operands {
                    members |= self.evaluate(operand)?;
                }
                members
            }
            RuleExpr::Intersection(operands) => {
                let mut operands = operands.iter();
                let mut members = match operands.next() {
                    Some(first) => self.evaluate(first)?,
                    None => RoaringBitmap::new(),
                };
                for operand in operands {
                    members &= self.evaluate(operand)?;
                }
                members
            }
            RuleExpr::Difference(base, subtrahends) => {
                let mut members = self.evaluate(base)?;
                for operand in subtrahends {
                    members -= self.evaluate(operand)?;
                }
                members
            }
            RuleExpr::Nested(inner) => self.evaluate(inner)?,
        })
    }

    /// Maps a concept reference to its index, applying the unknown concept policy.
    fn resolve(&mut self, concept: &ConceptRef) -> ExpansionResult<Option<u32>> {
        if let Some(idx) = self.materializer.graph.index_of(concept.id) {
            return Ok(Some(idx));
        }
        match self.materializer.config.unknown_concepts {
            UnknownConceptPolicy::Fail => Err(ExpansionError::UnknownConcept {
                valueset: self.key.to_string(),
                concept: concept.id,
            }),
            UnknownConceptPolicy::Skip => {
                warn!(valueset = %self.key, concept = concept.id, "Skipping rule on unknown concept");
                self.skipped.push(concept.id);
                Ok(None)
            }
        }
    }

    fn descendants(&self, idx: u32) -> RoaringBitmap {
        let graph = self.materializer.graph;
        if let Some(row) = self.materializer.closure.descendant_row(idx) {
            return row.clone();
        }
        // Closure was built without descendant sets
        let Some(id) = graph.id_of(idx) else {
            return RoaringBitmap::new();
        };
        HierarchyTraverser::new(graph)
            .descendants(id)
            .into_iter()
            .filter_map(|d| graph.index_of(d))
            .collect()
    }
}
