//! # snomed-valueset
//!
//! Valueset rule language for SNOMED CT.
//!
//! This crate provides:
//! - **Rule Parser**: Parse intensional valueset rules (a subsumption-only
//!   subset of ECL) into a [`RuleExpr`] tree
//! - **FHIR Compose**: Convert `ValueSet.compose` include/exclude blocks into rules
//! - **Definitions**: Versioned [`ValuesetDefinition`]s with stable fingerprints
//!
//! ## Rule Usage
//!
//! ```rust
//! use snomed_valueset::{parse, RuleExpr};
//!
//! // Diabetes mellitus and all its subtypes
//! let rule = parse("<< 73211009 |Diabetes mellitus|").unwrap();
//! assert!(matches!(rule, RuleExpr::DescendantOrSelfOf(_)));
//!
//! // Composite rule, applied left to right
//! let rule = parse("<< 73211009 MINUS << 46635009").unwrap();
//! assert_eq!(rule.to_string(), "<< 73211009 MINUS << 46635009");
//! ```
//!
//! ## Rule Syntax Quick Reference
//!
//! | Operator | Meaning | Example |
//! |----------|---------|---------|
//! | (none) | Exactly this concept | `404684003` |
//! | `<` | Descendants of | `< 404684003` |
//! | `<<` | Descendants or self of | `<< 404684003` |
//! | `<!` | Children of | `<! 404684003` |
//! | `>` | Ancestors of | `> 404684003` |
//! | `>>` | Ancestors or self of | `>> 404684003` |
//! | `*` | Any concept | `*` |
//! | `AND` / `,` | Intersection | `<< A AND << B` |
//! | `OR` | Union | `<< A OR << B` |
//! | `MINUS` | Difference | `<< A MINUS << B` |
//! | `( )` | Explicit grouping | `<< A MINUS (<< B OR << C)` |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod ast;
pub mod compose;
mod definition;
mod error;
mod parser;

pub use ast::{ConceptRef, RuleExpr};
pub use compose::{Compose, ComposeConcept, ComposeFilter, ComposeRule, ComposeSet, SNOMED_SYSTEM};
pub use definition::{
    load_catalog_json, DefinitionRecord, Fingerprint, RuleSource, ValuesetDefinition, ValuesetKey,
};
pub use error::{RuleError, RuleResult};
pub use parser::{normalize_expression, parse, MAX_RULE_DEPTH};

/// SNOMED CT Identifier type (64-bit unsigned integer).
pub type SctId = u64;

/// SCTID of the IS-A relationship type.
pub const IS_A: SctId = 116680003;
