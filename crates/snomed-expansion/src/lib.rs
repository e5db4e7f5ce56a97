//! # snomed-expansion
//!
//! Valueset materialization and expansion/subsumption queries over
//! precomputed SNOMED CT closures.
//!
//! This crate provides:
//! - **Snapshots**: graph, closure and materialized valuesets published as
//!   one atomically swapped unit
//! - **Materializer**: resolves [`ValuesetDefinition`]s into member sets
//! - **Worker Pool**: bounded, timed on-demand materialization for cache misses
//! - **Service**: `is_ancestor`, `subsumes` and `expand`, each against an
//!   explicit or latest snapshot version
//! - **Indexing**: hands finished member lists to an external indexer, with
//!   a filesystem implementation
//!
//! ## Quick Start
//!
//! ```ignore
//! use snomed_expansion::{rf2, ExpansionService, ServiceConfig, VersionToken};
//!
//! let service = ExpansionService::new(ServiceConfig::default());
//! service.load_catalog("valuesets.json")?;
//!
//! // Blocks readiness until the first closure is built
//! service.load_snapshot(rf2::load_snapshot_input("SnomedCT_InternationalRF2")?).await?;
//!
//! let expansion = service.expand("diabetes", "1", VersionToken::Latest).await?;
//! let first_page = expansion.page(0, 100);
//! ```
//!
//! ## Architecture
//!
//! ```text
//!  SnapshotInput ──► SnapshotBuilder ──► SnapshotManager ──► ExpansionService
//!                    graph → closure      one live Arc        resolve(VersionToken)
//!                    → eager valuesets    atomic swap         cache hit | pool job
//!                                                                   │
//!                                                ValuesetIndexer ◄──┘ publish()
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod catalog;
mod config;
mod error;
mod indexing;
mod materializer;
pub mod persistence;
mod pool;
pub mod rf2;
mod service;
pub mod snapshot;

pub use catalog::ValuesetCatalog;
pub use config::{PoolConfig, ServiceConfig};
pub use error::{ExpansionError, ExpansionResult};
pub use indexing::{IndexBatch, IndexedValueset, ValuesetIndexer};
pub use materializer::{MaterializeConfig, MaterializedValueset, Materializer, UnknownConceptPolicy};
pub use persistence::{DirectoryIndexer, ValuesetFile, ValuesetManifest};
pub use pool::MaterializationPool;
pub use service::{
    Expansion, ExpansionPage, ExpansionService, ServiceStats, Subsumption, EXPRESSION_VERSION, MAX_PAGE_SIZE,
};
pub use snapshot::{
    MaterializationPolicy, Snapshot, SnapshotBuilder, SnapshotInput, SnapshotManager, SnapshotVersion,
    VersionToken,
};

// Re-export commonly used types from dependencies for convenience
pub use snomed_hierarchy::{CancellationToken, Concept, Relationship, SctId};
pub use snomed_valueset::{ValuesetDefinition, ValuesetKey};
