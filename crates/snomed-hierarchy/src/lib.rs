//! # snomed-hierarchy
//!
//! Concept graph store and precomputed transitive closure for SNOMED CT
//! IS-A hierarchies.
//!
//! ## Quick Start
//!
//! ```ignore
//! use snomed_hierarchy::{ClosureBuilder, ClosureConfig, ConceptGraph, GraphConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! // Load one terminology snapshot
//! let graph = ConceptGraph::load(concepts, relationships, &GraphConfig::default())?;
//!
//! // Build ancestor and descendant closures (one-time, per snapshot)
//! let closure = ClosureBuilder::new(ClosureConfig::default())
//!     .build(&graph, &CancellationToken::new())?;
//!
//! // O(1) subsumption checks
//! assert!(closure.is_ancestor_of(73211009, 44054006));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     snomed-hierarchy                         │
//! │                                                              │
//! │  ConceptGraph   dense u32 indices + parent/child lists       │
//! │  ClosureBuilder Kahn levels, one rayon fan-out per level     │
//! │  ClosureTable   roaring ancestor/descendant bitmaps          │
//! │  Traverser      BFS over any HierarchySource (fallback)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Feature Flags
//!
//! - `parallel` (default) - Computes each closure level on the rayon pool

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bitset;
pub mod closure;
mod error;
mod graph;
mod traits;
mod traverser;
mod types;

pub use bitset::{ConceptBitSet, ConceptIdRegistry};
pub use closure::{ClosureBuilder, ClosureConfig, ClosureStats, ClosureTable};
pub use error::{HierarchyError, HierarchyResult, IntegrityViolation};
pub use graph::{ConceptGraph, GraphConfig, Strictness};
pub use traits::HierarchySource;
pub use traverser::HierarchyTraverser;
pub use types::{Concept, Relationship};

// Re-export commonly used types from dependencies for convenience
pub use snomed_valueset::{SctId, IS_A};
pub use tokio_util::sync::CancellationToken;
