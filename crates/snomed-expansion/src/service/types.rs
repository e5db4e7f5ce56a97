//! Result types for the expansion service.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use snomed_hierarchy::SctId;
use snomed_valueset::ValuesetKey;

use crate::materializer::{MaterializedValueset, UnknownConceptPolicy};
use crate::snapshot::SnapshotVersion;

/// Largest page [`Expansion::page`] returns.
pub const MAX_PAGE_SIZE: usize = 1_000;

/// Hierarchical relation between two concepts, read as "a … b".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Subsumption {
    /// Same concept.
    Equivalent,
    /// `a` is an ancestor of `b`.
    SubsumedBy,
    /// `b` is an ancestor of `a`.
    Subsumes,
    /// Neither is an ancestor of the other.
    Unrelated,
}

impl fmt::Display for Subsumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Equivalent => "EQUIVALENT",
            Self::SubsumedBy => "SUBSUMED_BY",
            Self::Subsumes => "SUBSUMES",
            Self::Unrelated => "UNRELATED",
        };
        f.write_str(s)
    }
}

/// A complete valueset expansion.
#[derive(Debug, Clone)]
pub struct Expansion {
    valueset: Arc<MaterializedValueset>,
    cached: bool,
}

impl Expansion {
    pub(crate) fn new(valueset: Arc<MaterializedValueset>, cached: bool) -> Self {
        Self { valueset, cached }
    }

    /// Valueset identity.
    pub fn key(&self) -> &ValuesetKey {
        &self.valueset.key
    }

    /// Snapshot the members belong to.
    pub fn snapshot(&self) -> &SnapshotVersion {
        &self.valueset.snapshot
    }

    /// Unknown concept policy that applied.
    pub fn policy(&self) -> UnknownConceptPolicy {
        self.valueset.policy
    }

    /// Concepts left out under [`UnknownConceptPolicy::Skip`].
    pub fn skipped(&self) -> &[SctId] {
        &self.valueset.skipped
    }

    /// True if served from the snapshot's valueset cache.
    pub fn was_cached(&self) -> bool {
        self.cached
    }

    /// Number of members.
    pub fn total(&self) -> usize {
        self.valueset.len()
    }

    /// Membership test.
    pub fn contains(&self, concept_id: SctId) -> bool {
        self.valueset.contains(concept_id)
    }

    /// All members, sorted.
    pub fn concepts(&self) -> Vec<SctId> {
        self.valueset.to_sorted_ids()
    }

    /// The underlying materialized valueset.
    pub fn materialized(&self) -> &Arc<MaterializedValueset> {
        &self.valueset
    }

    /// One page of sorted members. `count` is capped at [`MAX_PAGE_SIZE`].
    pub fn page(&self, offset: usize, count: usize) -> ExpansionPage {
        let count = count.min(MAX_PAGE_SIZE);
        // Graph registries assign indices in ascending SCTID order, so bitmap order is sorted order.
        let concepts: Vec<SctId> = self.valueset.members.iter().skip(offset).take(count).collect();
        ExpansionPage {
            key: self.valueset.key.clone(),
            snapshot: self.valueset.snapshot.clone(),
            total: self.total(),
            offset,
            count: concepts.len(),
            concepts,
        }
    }
}

/// A slice of an [`Expansion`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpansionPage {
    /// Valueset identity.
    pub key: ValuesetKey,
    /// Snapshot the members belong to.
    pub snapshot: SnapshotVersion,
    /// Members in the whole expansion.
    pub total: usize,
    /// Index of the first returned member.
    pub offset: usize,
    /// Members returned.
    pub count: usize,
    /// Sorted member SCTIDs.
    pub concepts: Vec<SctId>,
}

/// Counters kept by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    /// Expansions served from a snapshot cache.
    pub cache_hits: u64,
    /// Expansions that needed materialization.
    pub cache_misses: u64,
    /// Materializations completed on demand.
    pub materializations: u64,
    /// Requests rejected because the queue was full.
    pub rejected: u64,
    /// Requests that timed out waiting for materialization.
    pub timeouts: u64,
    /// Snapshots published.
    pub snapshots_published: u64,
    /// Rebuilds that failed or were superseded.
    pub rebuild_failures: u64,
}

impl ServiceStats {
    /// Cache hit rate as a percentage.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / total as f64) * 100.0
        }
    }
}

impl fmt::Display for ServiceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Expansion Service Statistics:")?;
        writeln!(f, "  Cache hits:        {}", self.cache_hits)?;
        writeln!(f, "  Cache misses:      {}", self.cache_misses)?;
        writeln!(f, "  Hit rate:          {:.1}%", self.cache_hit_rate())?;
        writeln!(f, "  Materializations:  {}", self.materializations)?;
        writeln!(f, "  Rejected:          {}", self.rejected)?;
        writeln!(f, "  Timeouts:          {}", self.timeouts)?;
        writeln!(f, "  Snapshots:         {}", self.snapshots_published)?;
        writeln!(f, "  Failed rebuilds:   {}", self.rebuild_failures)?;
        Ok(())
    }
}
