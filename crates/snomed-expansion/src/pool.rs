//! Bounded worker pool for on-demand materialization.
//!
//! Cache misses are queued on a bounded channel and drained by a fixed set
//! of worker tasks. The CPU-bound evaluation runs on tokio's blocking pool.
//! A full queue rejects immediately; a caller whose job does not finish in
//! time gets [`ExpansionError::CacheMissTimeout`] while the job keeps
//! running, so a retry will usually hit the cache.

use std::sync::Arc;
use std::time::Instant;

use snomed_valueset::ValuesetDefinition;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::error::{ExpansionError, ExpansionResult};
use crate::materializer::{MaterializeConfig, MaterializedValueset, Materializer};
use crate::snapshot::{CacheKey, Snapshot};

type Reply = oneshot::Sender<ExpansionResult<Arc<MaterializedValueset>>>;

struct Job {
    snapshot: Arc<Snapshot>,
    key: CacheKey,
    definition: Arc<ValuesetDefinition>,
    reply: Reply,
}

/// Materialization workers behind a bounded queue.
pub struct MaterializationPool {
    sender: mpsc::Sender<Job>,
    // Held here too so the channel stays open with zero workers.
    _receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    workers: Vec<JoinHandle<()>>,
    config: PoolConfig,
}

impl MaterializationPool {
    /// Starts the workers. Must be called within a tokio runtime when
    /// `config.workers > 0`.
    pub fn new(config: PoolConfig, materialize: MaterializeConfig) -> Self {
        let depth = config.queue_depth.max(1);
        let (sender, receiver) = mpsc::channel(depth);
        let receiver = Arc::new(Mutex::new(receiver));
        let materialize = Arc::new(materialize);

        let workers = (0..config.workers)
            .map(|worker| tokio::spawn(work(worker, receiver.clone(), materialize.clone())))
            .collect();

        Self {
            sender,
            _receiver: receiver,
            workers,
            config: PoolConfig {
                queue_depth: depth,
                ..config
            },
        }
    }

    /// Queues a materialization and waits for it, up to the configured timeout.
    ///
    /// # Errors
    ///
    /// - [`ExpansionError::QueueFull`] if `queue_depth` jobs are already pending
    /// - [`ExpansionError::CacheMissTimeout`] if the job is not done in time
    /// - whatever the materialization itself fails with
    pub async fn submit(
        &self,
        snapshot: Arc<Snapshot>,
        key: CacheKey,
        definition: Arc<ValuesetDefinition>,
    ) -> ExpansionResult<Arc<MaterializedValueset>> {
        let label = definition.key.to_string();
        let (reply, response) = oneshot::channel();
        let job = Job {
            snapshot,
            key,
            definition,
            reply,
        };

        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                warn!(valueset = %label, depth = self.config.queue_depth, "Materialization queue full");
                ExpansionError::QueueFull {
                    depth: self.config.queue_depth,
                }
            }
            mpsc::error::TrySendError::Closed(_) => ExpansionError::PoolClosed,
        })?;

        let start = Instant::now();
        match tokio::time::timeout(self.config.timeout(), response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ExpansionError::Task(format!("worker dropped job for {label}"))),
            Err(_) => {
                let waited_ms = start.elapsed().as_millis() as u64;
                warn!(valueset = %label, waited_ms, "Materialization timed out");
                Err(ExpansionError::CacheMissTimeout {
                    valueset: label,
                    waited_ms,
                })
            }
        }
    }

    /// Jobs waiting in the queue.
    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Pool settings, with the queue depth as actually applied.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of worker tasks.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for MaterializationPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}

impl std::fmt::Debug for MaterializationPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterializationPool")
            .field("workers", &self.workers.len())
            .field("pending", &self.pending())
            .field("config", &self.config)
            .finish()
    }
}

async fn work(worker: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>, config: Arc<MaterializeConfig>) {
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            debug!(worker, "Materialization queue closed");
            return;
        };

        let config = config.clone();
        let Job {
            snapshot,
            key,
            definition,
            reply,
        } = job;

        let result = tokio::task::spawn_blocking(move || -> ExpansionResult<Arc<MaterializedValueset>> {
            let materialized = Materializer::new(&snapshot, &config)
                .materialize(&definition)
                .map(Arc::new)?;
            snapshot.valuesets().insert(key, materialized.clone());
            Ok(materialized)
        })
        .await
        .unwrap_or_else(|e| Err(ExpansionError::Task(e.to_string())));

        // The caller may have timed out; the result is cached either way.
        let _ = reply.send(result);
    }
}
