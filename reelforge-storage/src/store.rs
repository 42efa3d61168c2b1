use async_trait::async_trait;
use reelforge_core::{Result, Run, Snapshot, Stage};

/// Durable record of runs, their stages and snapshots.
///
/// Runs are stored as a header record plus one record per (run id, stage id).
/// Every mutating call is atomic: readers never observe a stage written
/// without its run header, or a partially replaced stage list.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a new run together with its full stage list.
    async fn insert_run(&self, run: &Run) -> Result<()>;

    /// Run header with stages sorted by order.
    async fn load_run(&self, run_id: &str) -> Result<Option<Run>>;

    /// All runs, newest first.
    async fn list_runs(&self) -> Result<Vec<Run>>;

    /// Upsert one stage and the run header in a single write.
    async fn save_stage(&self, run: &Run, stage: &Stage) -> Result<()>;

    /// Update the run header only.
    async fn update_run(&self, run: &Run) -> Result<()>;

    /// Drop every stored stage of the run and write `run.stages` instead.
    async fn replace_stages(&self, run: &Run) -> Result<()>;

    async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    async fn load_snapshot(&self, snapshot_id: &str) -> Result<Option<Snapshot>>;

    /// Snapshots of one run, newest first.
    async fn list_snapshots(&self, run_id: &str) -> Result<Vec<Snapshot>>;
}

/// Key of a stage record: one per (run, stage name).
pub(crate) fn stage_key(run_id: &str, stage_id: &str) -> String {
    format!("{}/{}", run_id, stage_id)
}

pub(crate) fn stage_prefix(run_id: &str) -> String {
    format!("{}/", run_id)
}

pub(crate) fn sort_newest_first(runs: &mut [Run]) {
    runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
