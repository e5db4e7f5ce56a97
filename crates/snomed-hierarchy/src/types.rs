//! Ingestion records handed over by the release parser.

use serde::{Deserialize, Serialize};
use snomed_valueset::{SctId, IS_A};

/// A concept record.
///
/// # Examples
///
/// ```
/// use snomed_hierarchy::Concept;
///
/// let concept = Concept::new(73211009);
/// assert!(concept.active);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    /// Concept identifier (SCTID).
    pub id: SctId,
    /// Whether the concept is active in this snapshot.
    pub active: bool,
    /// Module the concept belongs to.
    pub module_id: SctId,
    /// Effective date in YYYYMMDD format.
    pub effective_time: u32,
}

impl Concept {
    /// Core module of the international edition.
    pub const CORE_MODULE: SctId = 900000000000207008;

    /// Creates an active core-module concept.
    pub fn new(id: SctId) -> Self {
        Self {
            id,
            active: true,
            module_id: Self::CORE_MODULE,
            effective_time: 0,
        }
    }

    /// Creates an inactive core-module concept.
    pub fn inactive(id: SctId) -> Self {
        Self {
            active: false,
            ..Self::new(id)
        }
    }
}

/// A relationship record. Only active IS-A rows shape the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Relationship identifier.
    pub id: SctId,
    /// Source (more specific) concept.
    pub source_id: SctId,
    /// Destination (more general) concept.
    pub destination_id: SctId,
    /// Relationship type.
    pub type_id: SctId,
    /// Whether the relationship is active.
    pub active: bool,
}

impl Relationship {
    /// Creates an active IS-A relationship `source → destination`.
    pub fn is_a(id: SctId, source_id: SctId, destination_id: SctId) -> Self {
        Self {
            id,
            source_id,
            destination_id,
            type_id: IS_A,
            active: true,
        }
    }

    /// Returns true if this is an IS-A relationship.
    pub fn is_is_a(&self) -> bool {
        self.type_id == IS_A
    }

    /// Returns true if the relationship takes part in closure computation.
    pub fn is_hierarchy_edge(&self) -> bool {
        self.active && self.is_is_a()
    }
}
