//! Error types for valueset rule parsing and definition loading.

use thiserror::Error;

/// Errors that can occur while parsing rules or loading definitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// Parse error at a specific position in the input.
    #[error("parse error at position {position}: {message}")]
    ParseError {
        /// Position in the input where the error occurred.
        position: usize,
        /// Description of the error.
        message: String,
    },

    /// Rule expression is incomplete.
    #[error("rule is incomplete: {0}")]
    Incomplete(String),

    /// Empty input provided.
    #[error("empty rule expression")]
    EmptyExpression,

    /// The rule nests deeper than the parser accepts.
    #[error("rule nests {depth} levels deep, limit is {limit}")]
    TooDeep {
        /// Nesting found.
        depth: usize,
        /// Accepted maximum.
        limit: usize,
    },

    /// Invalid concept ID format.
    #[error("invalid concept ID: {0}")]
    InvalidConceptId(String),

    /// A compose filter uses a property or operator outside the subsumption primitives.
    #[error("unsupported compose filter: {property} {op}")]
    UnsupportedFilter {
        /// Filter property (only `concept` is supported).
        property: String,
        /// Filter operator.
        op: String,
    },

    /// A compose block produced no SNOMED CT include rules.
    #[error("compose has no SNOMED CT include rules")]
    EmptyCompose,

    /// A catalog record could not be decoded.
    #[error("invalid valueset definition: {0}")]
    InvalidDefinition(String),
}

/// Result type for rule operations.
pub type RuleResult<T> = std::result::Result<T, RuleError>;
