//! Publication of snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use snomed_hierarchy::CancellationToken;
use tracing::{debug, info};

use super::{Snapshot, SnapshotVersion, VersionToken};
use crate::error::{ExpansionError, ExpansionResult};

struct Rebuild {
    generation: u64,
    cancel: CancellationToken,
}

/// Holds the live snapshot and coordinates rebuilds.
///
/// Readers clone the live `Arc` and keep it for the whole query, so a swap
/// never changes the snapshot under a running expansion. At most one rebuild
/// is in flight; starting a new one cancels the previous token.
pub struct SnapshotManager {
    live: RwLock<Option<Arc<Snapshot>>>,
    next_generation: AtomicU64,
    rebuild: Mutex<Option<Rebuild>>,
}

impl Default for SnapshotManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotManager {
    /// Creates a manager with no live snapshot.
    pub fn new() -> Self {
        Self {
            live: RwLock::new(None),
            next_generation: AtomicU64::new(1),
            rebuild: Mutex::new(None),
        }
    }

    /// Starts a rebuild, superseding any rebuild still in flight.
    ///
    /// Returns the generation the new snapshot must carry and the token the
    /// build should poll.
    pub fn begin_rebuild(&self) -> (u64, CancellationToken) {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();

        let previous = self.rebuild.lock().replace(Rebuild {
            generation,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            debug!(superseded = previous.generation, by = generation, "Cancelling in-flight rebuild");
            previous.cancel.cancel();
        }
        (generation, cancel)
    }

    /// Cancels the in-flight rebuild, if any. Returns its generation.
    pub fn cancel_rebuild(&self) -> Option<u64> {
        let rebuild = self.rebuild.lock().take()?;
        rebuild.cancel.cancel();
        info!(generation = rebuild.generation, "Rebuild cancelled");
        Some(rebuild.generation)
    }

    /// Forgets a rebuild that failed, if it is still the current one.
    pub fn abandon(&self, generation: u64) {
        let mut rebuild = self.rebuild.lock();
        if rebuild.as_ref().is_some_and(|r| r.generation == generation) {
            *rebuild = None;
        }
    }

    /// Atomically replaces the live snapshot.
    ///
    /// # Errors
    ///
    /// [`ExpansionError::Superseded`] if the rebuild's token was cancelled;
    /// the live snapshot is left untouched.
    pub fn publish(&self, snapshot: Snapshot, cancel: &CancellationToken) -> ExpansionResult<Arc<Snapshot>> {
        let generation = snapshot.version().generation;
        let snapshot = Arc::new(snapshot);

        let previous = {
            let mut rebuild = self.rebuild.lock();
            if cancel.is_cancelled() {
                return Err(ExpansionError::Superseded { generation });
            }
            if rebuild.as_ref().is_some_and(|r| r.generation == generation) {
                *rebuild = None;
            }
            std::mem::replace(&mut *self.live.write(), Some(snapshot.clone()))
        };

        info!(
            version = %snapshot.version(),
            previous = previous.as_ref().map(|p| p.version().generation),
            "Snapshot published"
        );
        // Readers still pinning the old snapshot keep it alive; otherwise it drops here, off the lock.
        drop(previous);
        Ok(snapshot)
    }

    /// The live snapshot.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.live.read().clone()
    }

    /// Version of the live snapshot.
    pub fn live_version(&self) -> Option<SnapshotVersion> {
        self.live.read().as_ref().map(|s| s.version().clone())
    }

    /// Resolves a version token to a snapshot.
    ///
    /// # Errors
    ///
    /// [`ExpansionError::NoSnapshot`] before the first publish and
    /// [`ExpansionError::VersionUnavailable`] for any generation other than
    /// the live one.
    pub fn resolve(&self, at: VersionToken) -> ExpansionResult<Arc<Snapshot>> {
        let current = self.current();
        match (at, current) {
            (VersionToken::Latest, Some(snapshot)) => Ok(snapshot),
            (VersionToken::Exact(requested), Some(snapshot)) if snapshot.version().generation == requested => {
                Ok(snapshot)
            }
            (VersionToken::Exact(requested), Some(snapshot)) => Err(ExpansionError::VersionUnavailable {
                requested,
                live: Some(snapshot.version().generation),
            }),
            (VersionToken::Latest, None) => Err(ExpansionError::NoSnapshot),
            (VersionToken::Exact(requested), None) => Err(ExpansionError::VersionUnavailable { requested, live: None }),
        }
    }
}

impl std::fmt::Debug for SnapshotManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotManager")
            .field("live", &self.live_version())
            .field("next_generation", &self.next_generation.load(Ordering::SeqCst))
            .finish()
    }
}
