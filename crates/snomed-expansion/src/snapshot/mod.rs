//! Terminology snapshots.
//!
//! A [`Snapshot`] is the unit that gets published: one concept graph, the
//! closure built from it, and the valuesets materialized against that
//! closure. Snapshots are built off to the side by a [`SnapshotBuilder`] and
//! handed to the [`SnapshotManager`], which swaps them in atomically.

mod cache;
mod manager;

pub use cache::{CacheKey, ValuesetCache};
pub use manager::SnapshotManager;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use snomed_hierarchy::{
    CancellationToken, ClosureBuilder, ClosureConfig, ClosureTable, Concept, ConceptGraph, GraphConfig,
    HierarchyError, Relationship, SctId,
};
use snomed_valueset::{ValuesetDefinition, ValuesetKey};
use tracing::{info, warn};

use crate::error::{ExpansionError, ExpansionResult};
use crate::materializer::{MaterializeConfig, MaterializedValueset, Materializer};
use crate::service::Subsumption;

/// Identity of a published snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotVersion {
    /// Monotonic build number assigned by the snapshot manager.
    pub generation: u64,
    /// Terminology release label, e.g. `20240101`.
    pub release: String,
}

impl SnapshotVersion {
    /// Creates a version.
    pub fn new(generation: u64, release: impl Into<String>) -> Self {
        Self {
            generation,
            release: release.into(),
        }
    }
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.release, self.generation)
    }
}

/// Which snapshot a query runs against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionToken {
    /// Whatever is live when the query starts.
    #[default]
    Latest,
    /// One specific generation.
    Exact(u64),
}

impl From<u64> for VersionToken {
    fn from(generation: u64) -> Self {
        Self::Exact(generation)
    }
}

impl From<&SnapshotVersion> for VersionToken {
    fn from(version: &SnapshotVersion) -> Self {
        Self::Exact(version.generation)
    }
}

/// When catalog valuesets get materialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterializationPolicy {
    /// Before the snapshot is published.
    #[default]
    Eager,
    /// On the first `expand` of each valueset.
    Lazy,
}

/// Raw records for one terminology release.
#[derive(Debug, Clone, Default)]
pub struct SnapshotInput {
    /// Release label.
    pub release: String,
    /// Concept records.
    pub concepts: Vec<Concept>,
    /// Relationship records.
    pub relationships: Vec<Relationship>,
}

impl SnapshotInput {
    /// Creates an input.
    pub fn new(release: impl Into<String>, concepts: Vec<Concept>, relationships: Vec<Relationship>) -> Self {
        Self {
            release: release.into(),
            concepts,
            relationships,
        }
    }
}

/// One consistent graph, closure and valueset cache.
pub struct Snapshot {
    version: SnapshotVersion,
    graph: ConceptGraph,
    closure: ClosureTable,
    valuesets: ValuesetCache,
}

impl Snapshot {
    /// Snapshot identity.
    pub fn version(&self) -> &SnapshotVersion {
        &self.version
    }

    /// Concept graph.
    pub fn graph(&self) -> &ConceptGraph {
        &self.graph
    }

    /// Closure table.
    pub fn closure(&self) -> &ClosureTable {
        &self.closure
    }

    /// Materialized valuesets.
    pub fn valuesets(&self) -> &ValuesetCache {
        &self.valuesets
    }

    /// Returns true if `a` is a proper ancestor of `b`.
    ///
    /// # Errors
    ///
    /// [`HierarchyError::NotFound`] if either concept is not in the snapshot.
    pub fn is_ancestor(&self, a: SctId, b: SctId) -> ExpansionResult<bool> {
        self.require(a)?;
        self.require(b)?;
        Ok(self.closure.is_ancestor_of(a, b))
    }

    /// Classifies the hierarchical relation between `a` and `b`.
    pub fn subsumes(&self, a: SctId, b: SctId) -> ExpansionResult<Subsumption> {
        self.require(a)?;
        self.require(b)?;
        Ok(if a == b {
            Subsumption::Equivalent
        } else if self.closure.is_ancestor_of(a, b) {
            Subsumption::SubsumedBy
        } else if self.closure.is_ancestor_of(b, a) {
            Subsumption::Subsumes
        } else {
            Subsumption::Unrelated
        })
    }

    /// Materializes definitions in parallel.
    ///
    /// Failures are logged and left out; `expand` reports them on demand.
    pub fn materialize_all(
        &self,
        definitions: &[Arc<ValuesetDefinition>],
        config: &MaterializeConfig,
    ) -> HashMap<ValuesetKey, Arc<MaterializedValueset>> {
        let materializer = Materializer::new(self, config);
        definitions
            .par_iter()
            .filter_map(|definition| match materializer.materialize(definition) {
                Ok(materialized) => Some((definition.key.clone(), Arc::new(materialized))),
                Err(e) => {
                    warn!(valueset = %definition.key, error = %e, "Eager materialization failed");
                    None
                }
            })
            .collect()
    }

    fn require(&self, id: SctId) -> ExpansionResult<()> {
        if self.graph.contains(id) {
            Ok(())
        } else {
            Err(HierarchyError::NotFound(id).into())
        }
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("version", &self.version)
            .field("graph", &self.graph)
            .field("closure", &self.closure)
            .field("valuesets", &self.valuesets)
            .finish()
    }
}

/// Builds snapshots from raw release records.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    graph: GraphConfig,
    closure: ClosureConfig,
    materialize: MaterializeConfig,
    policy: MaterializationPolicy,
    lazy_cache_size: usize,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self {
            graph: GraphConfig::default(),
            closure: ClosureConfig::default(),
            materialize: MaterializeConfig::default(),
            policy: MaterializationPolicy::default(),
            lazy_cache_size: 1_000,
        }
    }
}

impl SnapshotBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets graph loading options.
    pub fn with_graph(mut self, graph: GraphConfig) -> Self {
        self.graph = graph;
        self
    }

    /// Sets closure options.
    pub fn with_closure(mut self, closure: ClosureConfig) -> Self {
        self.closure = closure;
        self
    }

    /// Sets materialization options for eager valuesets.
    pub fn with_materialize(mut self, materialize: MaterializeConfig) -> Self {
        self.materialize = materialize;
        self
    }

    /// Sets the materialization policy.
    pub fn with_policy(mut self, policy: MaterializationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the capacity of the on-demand valueset cache.
    pub fn with_lazy_cache_size(mut self, size: usize) -> Self {
        self.lazy_cache_size = size;
        self
    }

    /// Loads the graph, builds the closure and, under
    /// [`MaterializationPolicy::Eager`], materializes `definitions`.
    ///
    /// Nothing is shared with any live snapshot; on error the partial
    /// build is simply dropped.
    pub fn build(
        &self,
        input: SnapshotInput,
        generation: u64,
        definitions: &[Arc<ValuesetDefinition>],
        cancel: &CancellationToken,
    ) -> ExpansionResult<Snapshot> {
        let version = SnapshotVersion::new(generation, input.release);
        info!(%version, "Building snapshot");

        let graph = ConceptGraph::load(input.concepts, input.relationships, &self.graph)?;
        let closure = ClosureBuilder::new(self.closure.clone()).build(&graph, cancel)?;

        let mut snapshot = Snapshot {
            version,
            graph,
            closure,
            valuesets: ValuesetCache::new(self.lazy_cache_size),
        };

        if self.policy == MaterializationPolicy::Eager && !definitions.is_empty() {
            if cancel.is_cancelled() {
                return Err(ExpansionError::Hierarchy(HierarchyError::Cancelled));
            }
            let eager = snapshot.materialize_all(definitions, &self.materialize);
            info!(
                version = %snapshot.version,
                materialized = eager.len(),
                requested = definitions.len(),
                "Materialized catalog valuesets"
            );
            snapshot.valuesets = ValuesetCache::with_eager(eager, self.lazy_cache_size);
        }

        Ok(snapshot)
    }
}
