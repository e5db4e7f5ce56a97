//! Hand-off of materialized valuesets to an external index.

use std::collections::BTreeMap;

use serde::Serialize;
use snomed_hierarchy::SctId;
use snomed_valueset::{ValuesetDefinition, ValuesetKey};

use crate::error::ExpansionResult;
use crate::materializer::{MaterializedValueset, UnknownConceptPolicy};
use crate::snapshot::SnapshotVersion;

/// Receiver of finished, versioned member lists.
///
/// Implementations talk to the search backend (or write files); the core
/// only ever hands them a complete [`IndexBatch`].
pub trait ValuesetIndexer: Send + Sync {
    /// Writes one batch.
    fn publish(&self, batch: &IndexBatch) -> ExpansionResult<()>;
}

/// One valueset as handed to the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedValueset {
    /// Valueset identity.
    pub key: ValuesetKey,
    /// Human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Canonical rule text.
    pub rule: String,
    /// Hex fingerprint of the rule.
    pub fingerprint: String,
    /// Sorted members.
    pub members: Vec<SctId>,
    /// Concepts skipped as unknown.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SctId>,
    /// Unknown concept policy that applied.
    pub policy: UnknownConceptPolicy,
}

/// Everything materialized for one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexBatch {
    /// Snapshot the member lists belong to.
    pub snapshot: SnapshotVersion,
    /// Valuesets, sorted by key.
    pub valuesets: Vec<IndexedValueset>,
    /// Concept → `id|version` of every valueset containing it.
    pub membership: BTreeMap<SctId, Vec<String>>,
    /// Catalog valuesets that could not be materialized.
    pub failed: Vec<ValuesetKey>,
}

impl IndexBatch {
    /// Assembles a batch from definitions and their materializations.
    pub fn new<'a, I>(snapshot: SnapshotVersion, entries: I, failed: Vec<ValuesetKey>) -> Self
    where
        I: IntoIterator<Item = (&'a ValuesetDefinition, &'a MaterializedValueset)>,
    {
        let mut valuesets: Vec<IndexedValueset> = entries
            .into_iter()
            .map(|(definition, materialized)| IndexedValueset {
                key: definition.key.clone(),
                title: definition.title.clone(),
                rule: definition.canonical().to_string(),
                fingerprint: materialized.fingerprint.to_hex(),
                members: materialized.to_sorted_ids(),
                skipped: materialized.skipped.clone(),
                policy: materialized.policy,
            })
            .collect();
        valuesets.sort_by(|a, b| a.key.cmp(&b.key));

        let mut membership: BTreeMap<SctId, Vec<String>> = BTreeMap::new();
        for valueset in &valuesets {
            let label = valueset.key.to_string();
            for &concept in &valueset.members {
                membership.entry(concept).or_default().push(label.clone());
            }
        }

        Self {
            snapshot,
            valuesets,
            membership,
            failed,
        }
    }

    /// Number of valuesets.
    pub fn len(&self) -> usize {
        self.valuesets.len()
    }

    /// Returns true if the batch holds no valuesets.
    pub fn is_empty(&self) -> bool {
        self.valuesets.is_empty()
    }

    /// Valuesets containing `concept`.
    pub fn valuesets_of(&self, concept: SctId) -> &[String] {
        self.membership.get(&concept).map(Vec::as_slice).unwrap_or(&[])
    }
}
