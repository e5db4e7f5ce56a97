//! Service configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use snomed_hierarchy::{ClosureConfig, GraphConfig};

use crate::error::{ExpansionError, ExpansionResult};
use crate::materializer::MaterializeConfig;
use crate::snapshot::{MaterializationPolicy, SnapshotBuilder};

/// Bounds for on-demand materialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Worker tasks draining the queue.
    pub workers: usize,
    /// Pending jobs accepted before callers are rejected.
    pub queue_depth: usize,
    /// How long `expand` waits on a cache miss, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(4, |n| n.get()),
            queue_depth: 256,
            timeout_ms: 30_000,
        }
    }
}

impl PoolConfig {
    /// Sets the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the queue depth.
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Sets the cache-miss timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Cache-miss timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration for [`crate::ExpansionService`].
///
/// # Example
///
/// ```rust
/// use snomed_expansion::{MaterializationPolicy, ServiceConfig};
///
/// let config = ServiceConfig::from_json_str(r#"{"policy": "lazy", "pool": {"queue_depth": 8}}"#).unwrap();
/// assert_eq!(config.policy, MaterializationPolicy::Lazy);
/// assert_eq!(config.pool.queue_depth, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Graph loading.
    pub graph: GraphConfig,
    /// Closure building.
    pub closure: ClosureConfig,
    /// Valueset materialization.
    pub materialize: MaterializeConfig,
    /// Eager or lazy catalog materialization.
    pub policy: MaterializationPolicy,
    /// On-demand materialization pool.
    pub pool: PoolConfig,
    /// Capacity of each snapshot's on-demand valueset cache.
    pub lazy_cache_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            graph: GraphConfig::default(),
            closure: ClosureConfig::default(),
            materialize: MaterializeConfig::default(),
            policy: MaterializationPolicy::default(),
            pool: PoolConfig::default(),
            lazy_cache_size: 1_000,
        }
    }
}

impl ServiceConfig {
    /// Parses a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> ExpansionResult<Self> {
        serde_json::from_str(json).map_err(|e| ExpansionError::Serialization(e.to_string()))
    }

    /// Reads a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ExpansionResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ExpansionError::io_error(path, e))?;
        Self::from_json_str(&json)
    }

    /// Sets graph options.
    pub fn with_graph(mut self, graph: GraphConfig) -> Self {
        self.graph = graph;
        self
    }

    /// Sets closure options.
    pub fn with_closure(mut self, closure: ClosureConfig) -> Self {
        self.closure = closure;
        self
    }

    /// Sets materialization options.
    pub fn with_materialize(mut self, materialize: MaterializeConfig) -> Self {
        self.materialize = materialize;
        self
    }

    /// Sets the materialization policy.
    pub fn with_policy(mut self, policy: MaterializationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets pool options.
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Snapshot builder carrying these settings.
    pub fn snapshot_builder(&self) -> SnapshotBuilder {
        SnapshotBuilder::new()
            .with_graph(self.graph.clone())
            .with_closure(self.closure.clone())
            .with_materialize(self.materialize.clone())
            .with_policy(self.policy)
            .with_lazy_cache_size(self.lazy_cache_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materializer::UnknownConceptPolicy;
    use snomed_hierarchy::Strictness;

    #[test]
    fn test_defaults_from_empty_json() {
        let config = ServiceConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.policy, MaterializationPolicy::Eager);
        assert_eq!(config.pool.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_nested_overrides() {
        let config = ServiceConfig::from_json_str(
            r#"{
                "graph": {"strictness": "strict"},
                "closure": {"build_descendants": false},
                "materialize": {"unknown_concepts": "skip"},
                "pool": {"workers": 2, "timeout_ms": 50}
            }"#,
        )
        .unwrap();

        assert_eq!(config.graph.strictness, Strictness::Strict);
        assert!(!config.closure.build_descendants);
        assert!(config.closure.parallel);
        assert_eq!(config.materialize.unknown_concepts, UnknownConceptPolicy::Skip);
        assert_eq!(config.pool.workers, 2);
        assert_eq!(config.pool.queue_depth, 256);
        assert_eq!(config.pool.timeout(), Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_json() {
        let err = ServiceConfig::from_json_str("{\"policy\": \"sometimes\"}").unwrap_err();
        assert!(matches!(err, ExpansionError::Serialization(_)));
    }
}
