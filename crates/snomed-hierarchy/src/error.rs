//! Error types for graph loading and closure builds.

use std::fmt;

use snomed_valueset::SctId;
use thiserror::Error;

/// What made a relationship unacceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityViolation {
    /// An endpoint is not in the concept snapshot.
    MissingConcept(SctId),
    /// An active IS-A edge touches an inactive concept.
    InactiveEndpoint(SctId),
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingConcept(id) => write!(f, "references unknown concept {}", id),
            Self::InactiveEndpoint(id) => write!(f, "active IS-A edge touches inactive concept {}", id),
        }
    }
}

/// Errors raised by the graph store and closure builder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    /// Malformed or contradictory input graph.
    #[error("integrity error in relationship {relationship}: {violation}")]
    Integrity {
        /// Offending relationship ID.
        relationship: SctId,
        /// What was wrong with it.
        violation: IntegrityViolation,
    },

    /// Active IS-A edges form a cycle.
    #[error("cycle detected in IS-A hierarchy at concept {concept}")]
    CycleDetected {
        /// A concept lying on the cycle.
        concept: SctId,
    },

    /// Concept absent from the snapshot.
    #[error("Concept not found: {0}")]
    NotFound(SctId),

    /// The build was cancelled before completion.
    #[error("closure build cancelled")]
    Cancelled,

    /// The closure outgrew its configured entry budget.
    #[error("closure too large: {entries} entries exceeds limit {limit}")]
    ClosureTooLarge {
        /// Entries materialised when the limit was hit.
        entries: u64,
        /// Configured limit.
        limit: u64,
    },

    /// Allocation for the closure table failed.
    #[error("cannot allocate closure table for {concepts} concepts")]
    AllocationFailed {
        /// Number of concepts requested.
        concepts: usize,
    },

    /// The snapshot has more concepts than a dense u32 index can address.
    #[error("too many concepts for dense indexing: {0}")]
    TooManyConcepts(usize),
}

/// Result type for hierarchy operations.
pub type HierarchyResult<T> = std::result::Result<T, HierarchyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_integrity() {
        let err = HierarchyError::Integrity {
            relationship: 100000028,
            violation: IntegrityViolation::MissingConcept(73211009),
        };
        assert_eq!(
            err.to_string(),
            "integrity error in relationship 100000028: references unknown concept 73211009"
        );
    }

    #[test]
    fn test_error_display_cycle() {
        let err = HierarchyError::CycleDetected { concept: 3 };
        assert_eq!(err.to_string(), "cycle detected in IS-A hierarchy at concept 3");
    }

    #[test]
    fn test_error_display_not_found() {
        assert_eq!(HierarchyError::NotFound(42).to_string(), "Concept not found: 42");
    }

    #[test]
    fn test_error_display_too_large() {
        let err = HierarchyError::ClosureTooLarge {
            entries: 150,
            limit: 100,
        };
        assert_eq!(err.to_string(), "closure too large: 150 entries exceeds limit 100");
    }
}
