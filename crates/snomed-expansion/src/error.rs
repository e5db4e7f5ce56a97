//! Error types for the expansion crate.

use std::path::PathBuf;

use snomed_hierarchy::{HierarchyError, SctId};
use snomed_valueset::{RuleError, ValuesetKey};

/// Result type for expansion operations.
pub type ExpansionResult<T> = Result<T, ExpansionError>;

/// Errors raised while building snapshots or answering queries.
#[derive(Debug, thiserror::Error)]
pub enum ExpansionError {
    /// Invalid valueset rule or definition.
    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    /// Graph integrity, cycle, unknown concept or aborted closure build.
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    /// A valueset rule references a concept missing from the snapshot.
    #[error("valueset {valueset} references unknown concept {concept}")]
    UnknownConcept {
        /// Valueset key (`id|version`).
        valueset: String,
        /// Missing concept.
        concept: SctId,
    },

    /// The valueset is not registered in the catalog.
    #[error("valueset {0} is not registered")]
    UnknownValueset(ValuesetKey),

    /// No snapshot has been published yet.
    #[error("no terminology snapshot is loaded")]
    NoSnapshot,

    /// The requested snapshot generation is not the live one.
    #[error("snapshot generation {requested} is not available (live: {})", display_live(.live))]
    VersionUnavailable {
        /// Requested generation.
        requested: u64,
        /// Generation currently live, if any.
        live: Option<u64>,
    },

    /// The materialization queue is at capacity.
    #[error("materialization queue full ({depth} pending)")]
    QueueFull {
        /// Configured queue depth.
        depth: usize,
    },

    /// Materialization did not finish within the configured timeout.
    #[error("expansion of {valueset} not ready after {waited_ms}ms, retry later")]
    CacheMissTimeout {
        /// Valueset key or expression.
        valueset: String,
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// The worker pool has shut down.
    #[error("materialization pool is closed")]
    PoolClosed,

    /// A rebuild was superseded by a newer one.
    #[error("snapshot rebuild for generation {generation} was superseded")]
    Superseded {
        /// Generation that was abandoned.
        generation: u64,
    },

    /// A background task panicked or was aborted.
    #[error("background task failed: {0}")]
    Task(String),

    /// I/O error with path context.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Malformed RF2 release file.
    #[error("RF2 error in {path}: {message}")]
    Rf2 {
        /// File involved.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Invalid persisted file.
    #[error("Invalid file format: {message}")]
    InvalidFormat {
        /// What went wrong.
        message: String,
    },

    /// Fingerprint check failed on load.
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Fingerprint stored in the file.
        expected: String,
        /// Fingerprint of the stored rule.
        actual: String,
    },

    /// JSON (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Outbound indexer rejected a batch.
    #[error("indexing failed: {0}")]
    Index(String),
}

fn display_live(live: &Option<u64>) -> String {
    live.map_or_else(|| "none".to_string(), |g| g.to_string())
}

impl ExpansionError {
    /// Creates an I/O error with path context.
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Returns true if the caller should retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QueueFull { .. } | Self::CacheMissTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_unavailable_display() {
        let err = ExpansionError::VersionUnavailable {
            requested: 3,
            live: Some(4),
        };
        assert_eq!(err.to_string(), "snapshot generation 3 is not available (live: 4)");

        let err = ExpansionError::VersionUnavailable {
            requested: 1,
            live: None,
        };
        assert_eq!(err.to_string(), "snapshot generation 1 is not available (live: none)");
    }

    #[test]
    fn test_hierarchy_error_is_transparent() {
        let err: ExpansionError = HierarchyError::NotFound(42).into();
        assert_eq!(err.to_string(), "Concept not found: 42");
    }

    #[test]
    fn test_retryable() {
        assert!(ExpansionError::QueueFull { depth: 8 }.is_retryable());
        assert!(ExpansionError::CacheMissTimeout {
            valueset: "v|1".into(),
            waited_ms: 10
        }
        .is_retryable());
        assert!(!ExpansionError::NoSnapshot.is_retryable());
    }
}
