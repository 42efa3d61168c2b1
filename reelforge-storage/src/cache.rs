use crate::store::RunStore;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use reelforge_core::{Result, Run, Snapshot, Stage};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::trace;

struct Slots {
    runs: LruCache<String, Run>,
    /// Bumped by every write, under the same lock as the eviction.
    epoch: u64,
}

/// Read-through LRU cache in front of an authoritative store.
///
/// Writes go to the inner store first and only then evict the cached entry.
/// A copy loaded from the inner store is cached only if no write finished
/// while it was being read, so a slow read can never reinstate an old copy.
pub struct CachedRunStore {
    inner: Arc<dyn RunStore>,
    slots: Mutex<Slots>,
}

impl CachedRunStore {
    pub fn new(inner: Arc<dyn RunStore>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.clamp(1, 10_000)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            slots: Mutex::new(Slots {
                runs: LruCache::new(capacity),
                epoch: 0,
            }),
        }
    }

    fn invalidate(&self, run_id: &str) {
        let mut slots = self.slots.lock();
        slots.epoch = slots.epoch.wrapping_add(1);
        slots.runs.pop(run_id);
    }

    pub fn len(&self) -> usize {
        self.slots.lock().runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RunStore for CachedRunStore {
    async fn insert_run(&self, run: &Run) -> Result<()> {
        self.inner.insert_run(run).await?;
        self.invalidate(&run.id);
        Ok(())
    }

    async fn load_run(&self, run_id: &str) -> Result<Option<Run>> {
        let epoch = {
            let mut slots = self.slots.lock();
            if let Some(run) = slots.runs.get(run_id) {
                trace!(run_id, "run cache hit");
                return Ok(Some(run.clone()));
            }
            slots.epoch
        };

        let loaded = self.inner.load_run(run_id).await?;
        if let Some(run) = &loaded {
            let mut slots = self.slots.lock();
            if slots.epoch == epoch {
                slots.runs.put(run_id.to_string(), run.clone());
            } else {
                trace!(run_id, "write raced the load; not caching");
            }
        }
        Ok(loaded)
    }

    async fn list_runs(&self) -> Result<Vec<Run>> {
        self.inner.list_runs().await
    }

    async fn save_stage(&self, run: &Run, stage: &Stage) -> Result<()> {
        self.inner.save_stage(run, stage).await?;
        self.invalidate(&run.id);
        Ok(())
    }

    async fn update_run(&self, run: &Run) -> Result<()> {
        self.inner.update_run(run).await?;
        self.invalidate(&run.id);
        Ok(())
    }

    async fn replace_stages(&self, run: &Run) -> Result<()> {
        self.inner.replace_stages(run).await?;
        self.invalidate(&run.id);
        Ok(())
    }

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.inner.insert_snapshot(snapshot).await
    }

    async fn load_snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>> {
        self.inner.load_snapshot(snapshot_id).await
    }

    async fn list_snapshots(&self, run_id: &str) -> Result<Vec<Snapshot>> {
        self.inner.list_snapshots(run_id).await
    }
}
