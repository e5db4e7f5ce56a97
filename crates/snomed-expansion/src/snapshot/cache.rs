//! Per-snapshot cache of materialized valuesets.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use snomed_valueset::{Fingerprint, ValuesetKey};

use crate::materializer::MaterializedValueset;

/// What a cached member set was computed for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A catalog valueset.
    Valueset(ValuesetKey),
    /// An ad-hoc rule, keyed by its canonical text.
    Expression(String),
}

/// Materialized valuesets of one snapshot.
///
/// Eager entries are fixed when the snapshot is built. On-demand entries
/// live in a bounded LRU. An entry is only returned when its fingerprint
/// matches the current definition, so a redefined valueset is rebuilt
/// rather than patched.
pub struct ValuesetCache {
    eager: HashMap<ValuesetKey, Arc<MaterializedValueset>>,
    lazy: Mutex<LruCache<CacheKey, Arc<MaterializedValueset>>>,
}

impl ValuesetCache {
    /// Creates an empty cache.
    pub fn new(lazy_capacity: usize) -> Self {
        Self::with_eager(HashMap::new(), lazy_capacity)
    }

    /// Creates a cache seeded with eagerly materialized valuesets.
    pub fn with_eager(eager: HashMap<ValuesetKey, Arc<MaterializedValueset>>, lazy_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(lazy_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            eager,
            lazy: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Looks up a member set built from a definition with `fingerprint`.
    pub fn get(&self, key: &CacheKey, fingerprint: Fingerprint) -> Option<Arc<MaterializedValueset>> {
        if let CacheKey::Valueset(vs) = key {
            if let Some(hit) = self.eager.get(vs).filter(|m| m.fingerprint == fingerprint) {
                return Some(hit.clone());
            }
        }

        let mut lazy = self.lazy.lock();
        match lazy.get(key) {
            Some(hit) if hit.fingerprint == fingerprint => Some(hit.clone()),
            Some(_) => {
                lazy.pop(key);
                None
            }
            None => None,
        }
    }

    /// Stores an on-demand result.
    pub fn insert(&self, key: CacheKey, value: Arc<MaterializedValueset>) {
        self.lazy.lock().put(key, value);
    }

    /// All materialized catalog valuesets, newest definition per key, sorted by key.
    pub fn valuesets(&self) -> Vec<Arc<MaterializedValueset>> {
        let mut by_key: BTreeMap<ValuesetKey, Arc<MaterializedValueset>> = self
            .eager
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, value) in self.lazy.lock().iter() {
            if let CacheKey::Valueset(vs) = key {
                by_key.insert(vs.clone(), value.clone());
            }
        }
        by_key.into_values().collect()
    }

    /// Number of eager entries.
    pub fn eager_len(&self) -> usize {
        self.eager.len()
    }

    /// Number of on-demand entries.
    pub fn lazy_len(&self) -> usize {
        self.lazy.lock().len()
    }
}

impl std::fmt::Debug for ValuesetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValuesetCache")
            .field("eager", &self.eager_len())
            .field("lazy", &self.lazy_len())
            .finish()
    }
}
