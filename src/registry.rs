//! Partition registry: one serialized worker per key.
//!
//! Entries are created lazily on first submission and refreshed on every
//! later one. Workers report back through an idle hook when they drain, and
//! the registry then sweeps partitions that are both stale and idle.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use tracing::debug;

use crate::config::DispatchConfig;
use crate::processor::PartitionProcessor;
use crate::telemetry::metrics;
use crate::worker::{Completion, IdleHook, Worker};

struct PartitionEntry<I, O> {
    touched_at: DateTime<Utc>,
    worker: Worker<I, O>,
}

struct Partitions<I, O> {
    entries: DashMap<String, PartitionEntry<I, O>>,
    processor: Arc<dyn PartitionProcessor<I, O>>,
    idle_retention: chrono::Duration,
    sweep_hook: IdleHook,
}

/// Routes items to a per-key [`Worker`], so items sharing a key run one at a
/// time in submission order while distinct keys run in parallel.
///
/// Cloning is cheap and clones share the same partitions.
pub struct PartitionRegistry<I, O> {
    inner: Arc<Partitions<I, O>>,
}

impl<I, O> Clone for PartitionRegistry<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, O> PartitionRegistry<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Create a registry that reclaims partitions as soon as they go idle.
    pub fn new<F, Fut>(process: F) -> Self
    where
        F: Fn(String, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        Self::with_idle_retention(process, Duration::ZERO)
    }

    /// Create a registry that keeps idle partitions for at least `retention`
    /// after their last submission.
    pub fn with_idle_retention<F, Fut>(process: F, retention: Duration) -> Self
    where
        F: Fn(String, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        Self::from_processor(Arc::new(process), retention)
    }

    pub fn from_config<F, Fut>(process: F, config: &DispatchConfig) -> Self
    where
        F: Fn(String, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        Self::with_idle_retention(process, config.idle_retention())
    }

    pub fn from_processor(
        processor: Arc<dyn PartitionProcessor<I, O>>,
        retention: Duration,
    ) -> Self {
        let idle_retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let inner = Arc::new_cyclic(|weak: &Weak<Partitions<I, O>>| {
            let weak = weak.clone();
            let sweep_hook: IdleHook = Arc::new(move || {
                if let Some(partitions) = weak.upgrade() {
                    partitions.reclaim_idle();
                }
            });
            Partitions {
                entries: DashMap::new(),
                processor,
                idle_retention,
                sweep_hook,
            }
        });
        Self { inner }
    }

    /// Enqueue an item on the key's worker and return immediately.
    pub fn submit(&self, key: impl Into<String>, item: I) {
        let entry = self.inner.touch(key.into());
        // Enqueue while the shard guard is held so a concurrent sweep can't
        // see this worker as idle and drop it in between.
        entry
            .worker
            .submit(item, Some(Arc::clone(&self.inner.sweep_hook)));
    }

    /// Enqueue an item on the key's worker and return a handle to its outcome.
    pub fn submit_and_await(&self, key: impl Into<String>, item: I) -> Completion<O> {
        let entry = self.inner.touch(key.into());
        entry
            .worker
            .submit_and_await(item, Some(Arc::clone(&self.inner.sweep_hook)))
    }

    /// Remove every partition that is stale and has no queued or active
    /// work. Returns how many were removed.
    pub fn reclaim_idle(&self) -> usize {
        self.inner.reclaim_idle()
    }

    pub fn partition_count(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn contains_partition(&self, key: &str) -> bool {
        self.inner.entries.contains_key(key)
    }

    pub fn partition_keys(&self) -> Vec<String> {
        self.inner
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl<I, O> Partitions<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Get-or-create-or-refresh in one step under the key's shard lock.
    fn touch(&self, key: String) -> RefMut<'_, String, PartitionEntry<I, O>> {
        let now = Utc::now();
        let created_key = key.clone();
        self.entries
            .entry(key)
            .and_modify(|entry| entry.touched_at = now)
            .or_insert_with(|| {
                let processor = Arc::clone(&self.processor);
                let bound = created_key.clone();
                let worker = Worker::for_partition(
                    Arc::new(move |item: I| processor.process(bound.clone(), item)),
                    &created_key,
                );
                metrics::partitions_created().add(1, &[]);
                debug!(partition = %created_key, worker_id = %worker.id(), "partition created");
                PartitionEntry {
                    touched_at: now,
                    worker,
                }
            })
    }

    fn is_stale(&self, touched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(touched_at) >= self.idle_retention
    }

    fn reclaim_idle(&self) -> usize {
        let now = Utc::now();

        // Collect first: removing while iterating would deadlock on the
        // shard read guards.
        let candidates: Vec<(String, DateTime<Utc>, Worker<I, O>)> = self
            .entries
            .iter()
            .filter(|entry| {
                self.is_stale(entry.touched_at, now) && !entry.worker.has_pending_or_active_work()
            })
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.touched_at,
                    entry.worker.clone(),
                )
            })
            .collect();

        let mut reclaimed = 0;
        for (key, observed_at, observed_worker) in candidates {
            let removed = self.entries.remove_if(&key, |_, current| {
                current.touched_at == observed_at
                    && current.worker.same_as(&observed_worker)
                    && self.is_stale(current.touched_at, now)
                    && !current.worker.has_pending_or_active_work()
            });
            if removed.is_some() {
                reclaimed += 1;
                debug!(partition = %key, "partition reclaimed");
            }
        }

        if reclaimed > 0 {
            metrics::partitions_reclaimed().add(reclaimed as u64, &[]);
        }
        reclaimed
    }
}
