//! Expansion and subsumption service.
//!
//! The query-facing facade over the live snapshot. Every query resolves a
//! [`VersionToken`] to one snapshot `Arc` up front and answers entirely from
//! it, so a concurrent rebuild never produces a mixed-version answer.
//!
//! # Example
//!
//! ```ignore
//! use snomed_expansion::{ExpansionService, ServiceConfig, SnapshotInput, VersionToken};
//!
//! let service = ExpansionService::new(ServiceConfig::default());
//! service.register_definition(ValuesetDefinition::from_expression("diabetes", "1", "<< 73211009")?);
//!
//! let version = service.load_snapshot(SnapshotInput::new("20240101", concepts, relationships)).await?;
//!
//! // O(1) hierarchy checks
//! assert!(service.is_ancestor(73211009, 44054006, VersionToken::Latest)?);
//!
//! // Pinned to the version just loaded
//! let expansion = service.expand("diabetes", "1", (&version).into()).await?;
//! println!("{} members", expansion.total());
//! ```

mod types;

pub use types::{Expansion, ExpansionPage, ServiceStats, Subsumption, MAX_PAGE_SIZE};

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use snomed_hierarchy::SctId;
use snomed_valueset::{parse, ValuesetDefinition, ValuesetKey};
use tracing::{debug, error, info, warn};

use crate::catalog::ValuesetCatalog;
use crate::config::ServiceConfig;
use crate::error::{ExpansionError, ExpansionResult};
use crate::indexing::{IndexBatch, ValuesetIndexer};
use crate::pool::MaterializationPool;
use crate::snapshot::{CacheKey, Snapshot, SnapshotInput, SnapshotManager, SnapshotVersion, VersionToken};

/// Version label given to ad-hoc expressions.
pub const EXPRESSION_VERSION: &str = "expression";

/// Serves hierarchy and valueset queries over published snapshots.
pub struct ExpansionService {
    config: ServiceConfig,
    catalog: ValuesetCatalog,
    snapshots: SnapshotManager,
    pool: MaterializationPool,
    stats: RwLock<ServiceStats>,
}

impl ExpansionService {
    /// Creates a service with no snapshot loaded.
    ///
    /// Starts the materialization workers, so it must be called within a
    /// tokio runtime unless `config.pool.workers` is zero.
    pub fn new(config: ServiceConfig) -> Self {
        let pool = MaterializationPool::new(config.pool.clone(), config.materialize.clone());
        Self {
            config,
            catalog: ValuesetCatalog::new(),
            snapshots: SnapshotManager::new(),
            pool,
            stats: RwLock::new(ServiceStats::default()),
        }
    }

    /// Builds a snapshot from `input` and publishes it.
    ///
    /// The build runs on the blocking pool while queries keep being served
    /// from the current snapshot. Starting another load cancels this one.
    ///
    /// # Errors
    ///
    /// Any graph, closure or cancellation error. The live snapshot is left
    /// untouched on every error path.
    pub async fn load_snapshot(&self, input: SnapshotInput) -> ExpansionResult<SnapshotVersion> {
        let (generation, cancel) = self.snapshots.begin_rebuild();
        let builder = self.config.snapshot_builder();
        let definitions = self.catalog.definitions();
        let token = cancel.clone();

        let built = tokio::task::spawn_blocking(move || builder.build(input, generation, &definitions, &token))
            .await
            .unwrap_or_else(|e| Err(ExpansionError::Task(e.to_string())));

        let published = built.and_then(|snapshot| self.snapshots.publish(snapshot, &cancel));
        match published {
            Ok(snapshot) => {
                self.stats.write().snapshots_published += 1;
                Ok(snapshot.version().clone())
            }
            Err(e) => {
                self.snapshots.abandon(generation);
                self.stats.write().rebuild_failures += 1;
                error!(generation, error = %e, "Snapshot rebuild failed, keeping live snapshot");
                Err(e)
            }
        }
    }

    /// Cancels the in-flight rebuild, if any.
    pub fn cancel_rebuild(&self) -> Option<u64> {
        self.snapshots.cancel_rebuild()
    }

    /// Version of the live snapshot.
    pub fn current_version(&self) -> Option<SnapshotVersion> {
        self.snapshots.live_version()
    }

    /// Resolves a version token to its snapshot.
    pub fn snapshot(&self, at: VersionToken) -> ExpansionResult<Arc<Snapshot>> {
        self.snapshots.resolve(at)
    }

    /// Returns true if `a` is a proper ancestor of `b`.
    pub fn is_ancestor(&self, a: SctId, b: SctId, at: VersionToken) -> ExpansionResult<bool> {
        self.snapshots.resolve(at)?.is_ancestor(a, b)
    }

    /// Classifies how `a` relates to `b`.
    pub fn subsumes(&self, a: SctId, b: SctId, at: VersionToken) -> ExpansionResult<Subsumption> {
        self.snapshots.resolve(at)?.subsumes(a, b)
    }

    /// Direct parents.
    pub fn parents_of(&self, id: SctId, at: VersionToken) -> ExpansionResult<Vec<SctId>> {
        Ok(self.snapshots.resolve(at)?.graph().parents_of(id)?)
    }

    /// Direct children.
    pub fn children_of(&self, id: SctId, at: VersionToken) -> ExpansionResult<Vec<SctId>> {
        Ok(self.snapshots.resolve(at)?.graph().children_of(id)?)
    }

    /// Expands a catalog valueset.
    ///
    /// Served from the snapshot's cache when a materialization for the
    /// current definition exists; otherwise queued on the worker pool and
    /// awaited up to the configured timeout. Never returns a partial list.
    pub async fn expand(&self, id: &str, version: &str, at: VersionToken) -> ExpansionResult<Expansion> {
        let snapshot = self.snapshots.resolve(at)?;
        let definition = self.catalog.require(id, version)?;
        let key = CacheKey::Valueset(definition.key.clone());
        self.expand_in(snapshot, key, definition).await
    }

    /// Returns true if `code` is a member of the catalog valueset.
    ///
    /// Answered from the cached member set when one exists, otherwise the
    /// valueset is materialized first. Codes absent from the snapshot are
    /// never members.
    ///
    /// # Errors
    ///
    /// The same errors as [`ExpansionService::expand`].
    pub async fn validate_code(&self, id: &str, version: &str, code: SctId, at: VersionToken) -> ExpansionResult<bool> {
        let snapshot = self.snapshots.resolve(at)?;
        let definition = self.catalog.require(id, version)?;
        if !snapshot.graph().contains(code) {
            debug!(valueset = %definition.key, code, "Code not in snapshot");
            return Ok(false);
        }
        let key = CacheKey::Valueset(definition.key.clone());
        Ok(self.expand_in(snapshot, key, definition).await?.contains(code))
    }

    /// Expands ad-hoc rule text, caching by its canonical form.
    pub async fn expand_expression(&self, expression: &str, at: VersionToken) -> ExpansionResult<Expansion> {
        let snapshot = self.snapshots.resolve(at)?;
        let rule = parse(expression)?;
        let canonical = rule.to_string();
        let definition = Arc::new(ValuesetDefinition::new(
            ValuesetKey::new(canonical.clone(), EXPRESSION_VERSION),
            rule,
        ));
        self.expand_in(snapshot, CacheKey::Expression(canonical), definition)
            .await
    }

    async fn expand_in(
        &self,
        snapshot: Arc<Snapshot>,
        key: CacheKey,
        definition: Arc<ValuesetDefinition>,
    ) -> ExpansionResult<Expansion> {
        if let Some(hit) = snapshot.valuesets().get(&key, definition.fingerprint()) {
            self.stats.write().cache_hits += 1;
            return Ok(Expansion::new(hit, true));
        }
        self.stats.write().cache_misses += 1;

        match self.pool.submit(snapshot, key, definition).await {
            Ok(materialized) => {
                self.stats.write().materializations += 1;
                Ok(Expansion::new(materialized, false))
            }
            Err(e) => {
                match &e {
                    ExpansionError::QueueFull { .. } => self.stats.write().rejected += 1,
                    ExpansionError::CacheMissTimeout { .. } => self.stats.write().timeouts += 1,
                    _ => {}
                }
                Err(e)
            }
        }
    }

    /// Adds or replaces a valueset definition.
    ///
    /// A replaced definition has a new fingerprint, so existing member sets
    /// for it are no longer served; the next `expand` rebuilds them.
    pub fn register_definition(&self, definition: ValuesetDefinition) -> Option<Arc<ValuesetDefinition>> {
        self.catalog.register(definition)
    }

    /// Loads definitions from a JSON catalog file.
    pub fn load_catalog<P: AsRef<Path>>(&self, path: P) -> ExpansionResult<usize> {
        self.catalog.load_json_file(path)
    }

    /// All registered definitions.
    pub fn definitions(&self) -> Vec<Arc<ValuesetDefinition>> {
        self.catalog.definitions()
    }

    /// The definition catalog.
    pub fn catalog(&self) -> &ValuesetCatalog {
        &self.catalog
    }

    /// Materializes every catalog valueset in the pinned snapshot and hands
    /// the result to `indexer`.
    ///
    /// Valuesets that fail to materialize are logged and listed in
    /// [`IndexBatch::failed`].
    pub async fn publish(&self, indexer: &dyn ValuesetIndexer, at: VersionToken) -> ExpansionResult<IndexBatch> {
        let snapshot = self.snapshots.resolve(at)?;
        let definitions = self.catalog.definitions();
        let materialize = self.config.materialize.clone();

        let pinned = snapshot.clone();
        let batch = tokio::task::spawn_blocking(move || {
            let mut missing = Vec::new();
            let mut ready = Vec::new();
            for definition in &definitions {
                let key = CacheKey::Valueset(definition.key.clone());
                match pinned.valuesets().get(&key, definition.fingerprint()) {
                    Some(hit) => ready.push((definition.clone(), hit)),
                    None => missing.push(definition.clone()),
                }
            }

            let mut built = pinned.materialize_all(&missing, &materialize);
            let mut failed = Vec::new();
            for definition in missing {
                match built.remove(&definition.key) {
                    Some(materialized) => {
                        pinned
                            .valuesets()
                            .insert(CacheKey::Valueset(definition.key.clone()), materialized.clone());
                        ready.push((definition, materialized));
                    }
                    None => failed.push(definition.key.clone()),
                }
            }

            IndexBatch::new(
                pinned.version().clone(),
                ready.iter().map(|(d, m)| (d.as_ref(), m.as_ref())),
                failed,
            )
        })
        .await
        .map_err(|e| ExpansionError::Task(e.to_string()))?;

        if !batch.failed.is_empty() {
            warn!(snapshot = %batch.snapshot, failed = batch.failed.len(), "Some valuesets were not indexed");
        }
        indexer.publish(&batch)?;
        info!(snapshot = %batch.snapshot, valuesets = batch.len(), "Published valuesets to indexer");
        Ok(batch)
    }

    /// Usage counters.
    pub fn stats(&self) -> ServiceStats {
        self.stats.read().clone()
    }

    /// Resets usage counters.
    pub fn reset_stats(&self) {
        *self.stats.write() = ServiceStats::default();
    }

    /// Service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

impl std::fmt::Debug for ExpansionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpansionService")
            .field("live", &self.snapshots.live_version())
            .field("definitions", &self.catalog.len())
            .field("pool", &self.pool)
            .finish()
    }
}
