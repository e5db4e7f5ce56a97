//! Precomputed transitive closure for O(1) hierarchy lookups.
//!
//! The builder orders concepts into dependency levels (see `levels`) and
//! computes each concept's closure as the union of its neighbours and their
//! already-finalised closures:
//!
//! ```text
//! ancestors(c)   = ⋃ { p ∪ ancestors(p)   | p ∈ parents(c)  }   roots first
//! descendants(c) = ⋃ { k ∪ descendants(k) | k ∈ children(c) }   leaves first
//! ```
//!
//! No per-concept graph walk is repeated. Work is proportional to V + E plus
//! the total closure size, which is superlinear for wide poly-hierarchies:
//! a concept under many overlapping parents pays for every union. That is
//! an expected worst case; cap it with
//! [`ClosureConfig::with_max_entries`] if memory is tight.
//!
//! # Example
//!
//! ```ignore
//! use snomed_hierarchy::{ClosureBuilder, ClosureConfig, CancellationToken};
//!
//! let closure = ClosureBuilder::new(ClosureConfig::default())
//!     .build(&graph, &CancellationToken::new())?;
//!
//! if closure.is_ancestor_of(clinical_finding, diabetes) {
//!     println!("Diabetes is a clinical finding");
//! }
//! ```

mod levels;
mod stats;

pub use stats::ClosureStats;

use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use snomed_valueset::SctId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bitset::{ConceptBitSet, ConceptIdRegistry};
use crate::error::{HierarchyError, HierarchyResult};
use crate::graph::ConceptGraph;

/// Closure build options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClosureConfig {
    /// Also materialise descendant sets.
    pub build_descendants: bool,
    /// Spread each level across the rayon pool.
    pub parallel: bool,
    /// Abort once the closure holds more than this many entries.
    pub max_closure_entries: Option<u64>,
}

impl Default for ClosureConfig {
    fn default() -> Self {
        Self {
            build_descendants: true,
            parallel: true,
            max_closure_entries: None,
        }
    }
}

impl ClosureConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether descendant sets are built.
    pub fn with_descendants(mut self, build: bool) -> Self {
        self.build_descendants = build;
        self
    }

    /// Sets whether levels are computed in parallel.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Caps the total number of closure entries.
    pub fn with_max_entries(mut self, limit: u64) -> Self {
        self.max_closure_entries = Some(limit);
        self
    }
}

/// Builds [`ClosureTable`]s from a [`ConceptGraph`].
#[derive(Debug, Clone, Default)]
pub struct ClosureBuilder {
    config: ClosureConfig,
}

impl ClosureBuilder {
    /// Creates a builder.
    pub fn new(config: ClosureConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClosureConfig {
        &self.config
    }

    /// Computes the closure of `graph`.
    ///
    /// `cancel` is checked before every level; a cancelled build discards
    /// everything computed so far.
    ///
    /// # Errors
    ///
    /// - [`HierarchyError::CycleDetected`] if active IS-A edges form a cycle
    /// - [`HierarchyError::Cancelled`] if `cancel` fires mid-build
    /// - [`HierarchyError::ClosureTooLarge`] if the entry budget is exceeded
    /// - [`HierarchyError::AllocationFailed`] if the table cannot be allocated
    pub fn build(&self, graph: &ConceptGraph, cancel: &CancellationToken) -> HierarchyResult<ClosureTable> {
        let start = Instant::now();
        let n = graph.concept_count();
        info!(concepts = n, edges = graph.edge_count(), "Building transitive closure");

        let top_down = levels::topological_levels(
            n,
            |i| graph.parent_indices(i),
            |i| graph.child_indices(i),
        )
        .map_err(|idx| HierarchyError::CycleDetected {
            concept: graph.id_of(idx).unwrap_or_default(),
        })?;

        let mut budget = EntryBudget::new(self.config.max_closure_entries);

        let ancestors = self.sweep(n, &top_down, |i| graph.parent_indices(i), cancel, &mut budget)?;
        let ancestor_entries = budget.used;

        let descendants = if self.config.build_descendants {
            // The graph is acyclic once the top-down pass succeeded
            let bottom_up = levels::topological_levels(
                n,
                |i| graph.child_indices(i),
                |i| graph.parent_indices(i),
            )
            .map_err(|idx| HierarchyError::CycleDetected {
                concept: graph.id_of(idx).unwrap_or_default(),
            })?;
            Some(self.sweep(n, &bottom_up, |i| graph.child_indices(i), cancel, &mut budget)?)
        } else {
            None
        };
        let descendant_entries = budget.used - ancestor_entries;

        let mut depth = vec![0u32; n];
        for (level, members) in top_down.iter().enumerate() {
            for &i in members {
                depth[i as usize] = level as u32;
            }
        }

        let memory_estimate_bytes = ancestors
            .iter()
            .chain(descendants.iter().flatten())
            .map(RoaringBitmap::serialized_size)
            .sum::<usize>()
            + n * std::mem::size_of::<u32>();

        let stats = ClosureStats {
            concept_count: n,
            relationship_count: graph.edge_count(),
            max_hierarchy_depth: top_down.len().saturating_sub(1),
            level_count: top_down.len(),
            ancestor_entries,
            descendant_entries,
            avg_ancestors: average(ancestor_entries, n),
            avg_descendants: average(descendant_entries, n),
            build_time_ms: start.elapsed().as_millis() as u64,
            memory_estimate_bytes,
        };

        info!(
            levels = stats.level_count,
            ancestor_entries,
            descendant_entries,
            build_time_ms = stats.build_time_ms,
            "Transitive closure built"
        );

        Ok(ClosureTable {
            registry: graph.registry().clone(),
            ancestors,
            descendants,
            depth,
            stats,
        })
    }

    /// Fills one closure direction level by level.
    fn sweep<'g, F>(
        &self,
        n: usize,
        levels: &[Vec<u32>],
        neighbours: F,
        cancel: &CancellationToken,
        budget: &mut EntryBudget,
    ) -> HierarchyResult<Vec<RoaringBitmap>>
    where
        F: Fn(u32) -> &'g [u32] + Sync,
    {
        let mut rows: Vec<RoaringBitmap> = Vec::new();
        rows.try_reserve_exact(n)
            .map_err(|_| HierarchyError::AllocationFailed { concepts: n })?;
        rows.resize_with(n, RoaringBitmap::new);

        for (depth, level) in levels.iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(depth, "Closure build cancelled");
                return Err(HierarchyError::Cancelled);
            }

            let finished = &rows;
            let row_of = |i: u32| {
                let mut row = RoaringBitmap::new();
                for &p in neighbours(i) {
                    row.insert(p);
                    row |= &finished[p as usize];
                }
                (i, row)
            };

            let computed: Vec<(u32, RoaringBitmap)> = if self.parallel_enabled(level.len()) {
                self.par_level(level, &row_of)
            } else {
                level.iter().map(|&i| row_of(i)).collect()
            };

            // Join barrier: rows become visible only after the whole level ran
            for (i, row) in computed {
                budget.charge(row.len())?;
                rows[i as usize] = row;
            }
        }

        Ok(rows)
    }

    fn parallel_enabled(&self, level_len: usize) -> bool {
        cfg!(feature = "parallel") && self.config.parallel && level_len > 1
    }

    #[cfg(feature = "parallel")]
    fn par_level<R>(&self, level: &[u32], row_of: &R) -> Vec<(u32, RoaringBitmap)>
    where
        R: Fn(u32) -> (u32, RoaringBitmap) + Sync,
    {
        level.par_iter().map(|&i| row_of(i)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn par_level<R>(&self, level: &[u32], row_of: &R) -> Vec<(u32, RoaringBitmap)>
    where
        R: Fn(u32) -> (u32, RoaringBitmap),
    {
        level.iter().map(|&i| row_of(i)).collect()
    }
}

struct EntryBudget {
    used: u64,
    limit: Option<u64>,
}

impl EntryBudget {
    fn new(limit: Option<u64>) -> Self {
        Self { used: 0, limit }
    }

    fn charge(&mut self, entries: u64) -> HierarchyResult<()> {
        self.used += entries;
        match self.limit {
            Some(limit) if self.used > limit => Err(HierarchyError::ClosureTooLarge {
                entries: self.used,
                limit,
            }),
            _ => Ok(()),
        }
    }
}

fn average(total: u64, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        total as f64 / n as f64
    }
}

/// Immutable ancestor (and optional descendant) table of one snapshot.
///
/// Ancestor sets exclude the concept itself: `is_ancestor_of(a, a)` is
/// always false. Use the `*_or_self` accessors for reflexive sets.
pub struct ClosureTable {
    registry: Arc<ConceptIdRegistry>,
    ancestors: Vec<RoaringBitmap>,
    descendants: Option<Vec<RoaringBitmap>>,
    depth: Vec<u32>,
    stats: ClosureStats,
}

impl ClosureTable {
    /// Returns true if `ancestor` is a proper ancestor of `descendant`.
    ///
    /// Unknown concepts are never ancestors.
    #[inline]
    pub fn is_ancestor_of(&self, ancestor: SctId, descendant: SctId) -> bool {
        match (self.registry.get_index(ancestor), self.registry.get_index(descendant)) {
            (Some(a), Some(d)) => self.is_ancestor_index(a, d),
            _ => false,
        }
    }

    /// Index-level form of [`is_ancestor_of`](Self::is_ancestor_of).
    #[inline]
    pub fn is_ancestor_index(&self, ancestor: u32, descendant: u32) -> bool {
        self.ancestors
            .get(descendant as usize)
            .is_some_and(|row| row.contains(ancestor))
    }

    /// Proper ancestors of a concept, or `None` if it is unknown.
    pub fn ancestors(&self, id: SctId) -> Option<ConceptBitSet> {
        let idx = self.registry.get_index(id)?;
        Some(self.wrap(self.ancestors[idx as usize].clone()))
    }

    /// Ancestors including the concept itself.
    pub fn ancestors_or_self(&self, id: SctId) -> Option<ConceptBitSet> {
        let idx = self.registry.get_index(id)?;
        let mut row = self.ancestors[idx as usize].clone();
        row.insert(idx);
        Some(self.wrap(row))
    }

    /// Proper descendants of a concept.
    ///
    /// `None` if the concept is unknown or descendants were not built.
    pub fn descendants(&self, id: SctId) -> Option<ConceptBitSet> {
        let idx = self.registry.get_index(id)?;
        self.descendant_row(idx).map(|row| self.wrap(row.clone()))
    }

    /// Descendants including the concept itself.
    pub fn descendants_or_self(&self, id: SctId) -> Option<ConceptBitSet> {
        let idx = self.registry.get_index(id)?;
        let mut row = self.descendant_row(idx)?.clone();
        row.insert(idx);
        Some(self.wrap(row))
    }

    /// Raw ancestor bitmap of a concept index.
    pub fn ancestor_row(&self, index: u32) -> Option<&RoaringBitmap> {
        self.ancestors.get(index as usize)
    }

    /// Raw descendant bitmap of a concept index.
    pub fn descendant_row(&self, index: u32) -> Option<&RoaringBitmap> {
        self.descendants.as_ref()?.get(index as usize)
    }

    /// Returns true if descendant sets were built.
    pub fn has_descendants(&self) -> bool {
        self.descendants.is_some()
    }

    /// Longest path from a root to the concept.
    pub fn depth(&self, id: SctId) -> Option<u32> {
        let idx = self.registry.get_index(id)?;
        self.depth.get(idx as usize).copied()
    }

    /// Returns the id registry shared with the graph.
    pub fn registry(&self) -> &Arc<ConceptIdRegistry> {
        &self.registry
    }

    /// Number of concepts covered.
    pub fn concept_count(&self) -> usize {
        self.ancestors.len()
    }

    /// Returns build statistics.
    pub fn stats(&self) -> &ClosureStats {
        &self.stats
    }

    fn wrap(&self, row: RoaringBitmap) -> ConceptBitSet {
        ConceptBitSet::from_bitmap(row, self.registry.clone())
    }
}

impl std::fmt::Debug for ClosureTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureTable")
            .field("concepts", &self.concept_count())
            .field("has_descendants", &self.has_descendants())
            .field("ancestor_entries", &self.stats.ancestor_entries)
            .finish()
    }
}
