use crate::store::{sort_newest_first, RunStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use reelforge_core::{Error, Result, Run, Snapshot, Stage};
use std::collections::HashMap;

/// Process-local store. Used by tests and `--ephemeral` servers.
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<String, Run>>,
    snapshots: RwLock<HashMap<String, Snapshot>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn insert_run(&self, run: &Run) -> Result<()> {
        self.runs.write().insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: &str) -> Result<Option<Run>> {
        let mut run = self.runs.read().get(run_id).cloned();
        if let Some(run) = run.as_mut() {
            run.stages.sort_by_key(|s| s.order);
        }
        Ok(run)
    }

    async fn list_runs(&self) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = self.runs.read().values().cloned().collect();
        sort_newest_first(&mut runs);
        Ok(runs)
    }

    async fn save_stage(&self, run: &Run, stage: &Stage) -> Result<()> {
        let mut runs = self.runs.write();
        let stored = runs
            .get_mut(&run.id)
            .ok_or_else(|| Error::RunNotFound(run.id.clone()))?;

        let stages = std::mem::take(&mut stored.stages);
        *stored = run.header();
        stored.stages = stages;
        match stored.stages.iter_mut().find(|s| s.id == stage.id) {
            Some(existing) => *existing = stage.clone(),
            None => stored.stages.push(stage.clone()),
        }
        Ok(())
    }

    async fn update_run(&self, run: &Run) -> Result<()> {
        let mut runs = self.runs.write();
        let stored = runs
            .get_mut(&run.id)
            .ok_or_else(|| Error::RunNotFound(run.id.clone()))?;
        let stages = std::mem::take(&mut stored.stages);
        *stored = run.header();
        stored.stages = stages;
        Ok(())
    }

    async fn replace_stages(&self, run: &Run) -> Result<()> {
        let mut runs = self.runs.write();
        if !runs.contains_key(&run.id) {
            return Err(Error::RunNotFound(run.id.clone()));
        }
        runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.snapshots
            .write()
            .insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    async fn load_snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>> {
        Ok(self.snapshots.read().get(snapshot_id).cloned())
    }

    async fn list_snapshots(&self, run_id: &str) -> Result<Vec<Snapshot>> {
        let mut snapshots: Vec<Snapshot> = self
            .snapshots
            .read()
            .values()
            .filter(|s| s.run_id == run_id)
            .cloned()
            .collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(snapshots)
    }
}
