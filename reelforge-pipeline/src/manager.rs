//! Pipeline state machine.
//!
//! Every transition is written through the `RunStore` before the call
//! returns, so the store is always the latest truth. Calls touching the same
//! run are serialized by a per-run async lock; different runs never contend.

use crate::error::{PipelineError, Result};
use chrono::Utc;
use dashmap::DashMap;
use reelforge_core::config::PipelineConfig;
use reelforge_core::{
    build_stages, default_stages, derive_run_status, extract_asset_refs, progress,
    validate_stage_list, Error, RestartOrigin, Run, RunReport, RunStatus, RunSummary, Snapshot,
    SnapshotSummary, Stage, StageDefinition, StageFailure, StageStatus, FailureKind,
};
use reelforge_storage::RunStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Parameters for a new run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateRun {
    pub source_url: String,
    pub target_duration: f64,
    #[serde(default)]
    pub title: Option<String>,
    /// Custom stage list; the default catalogue when absent.
    #[serde(default)]
    pub stages: Option<Vec<StageDefinition>>,
}

/// Requested stage transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StageUpdate {
    pub status: StageStatus,
    pub output: Option<Value>,
    pub error: Option<StageFailure>,
}

impl StageUpdate {
    pub fn running() -> Self {
        Self {
            status: StageStatus::Running,
            output: None,
            error: None,
        }
    }

    pub fn completed(output: Value) -> Self {
        Self {
            status: StageStatus::Completed,
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(failure: StageFailure) -> Self {
        Self {
            status: StageStatus::Error,
            output: None,
            error: Some(failure),
        }
    }
}

/// Holds one run's lock. Dropping it releases the lock and forgets the
/// entry once nobody else holds or waits on it.
struct RunGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    run_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.run_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

pub struct PipelineManager {
    store: Arc<dyn RunStore>,
    config: PipelineConfig,
    definitions: Vec<StageDefinition>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PipelineManager {
    pub fn new(store: Arc<dyn RunStore>, config: PipelineConfig) -> Self {
        Self::with_definitions(store, config, default_stages())
    }

    pub fn with_definitions(
        store: Arc<dyn RunStore>,
        config: PipelineConfig,
        definitions: Vec<StageDefinition>,
    ) -> Self {
        Self {
            store,
            config,
            definitions,
            locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    async fn lock(&self, run_id: &str) -> RunGuard<'_> {
        let lock = self
            .locks
            .entry(run_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        RunGuard {
            locks: &self.locks,
            run_id: run_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Fail every stage left `running` by a previous process. Nothing can
    /// still be executing it, and a running stage blocks resume and rerun.
    /// Returns how many stages were failed.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        let mut recovered = 0;
        for stored in self.store.list_runs().await? {
            if !stored.stages.iter().any(|s| s.status == StageStatus::Running) {
                continue;
            }
            let _guard = self.lock(&stored.id).await;
            let mut run = self.get_run(&stored.id).await?;
            let interrupted: Vec<usize> = run
                .stages
                .iter()
                .enumerate()
                .filter(|(_, s)| s.status == StageStatus::Running)
                .map(|(i, _)| i)
                .collect();
            for index in interrupted {
                let stage_id = run.stages[index].id.clone();
                let failure = StageFailure::new(FailureKind::Internal, "interrupted before completion").with_context(
                    json!({
                        "stage": stage_id,
                        "fatal": false,
                        "interrupted": true,
                        "started_at": run.stages[index].started_at,
                    }),
                );
                self.apply(&mut run, index, StageUpdate::failed(failure)).await?;
                warn!(run_id = %run.id, stage_id = %stage_id, "Interrupted stage marked as failed");
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    pub async fn create_run(&self, request: CreateRun) -> Result<Run> {
        let source_url = request.source_url.trim().to_string();
        if source_url.is_empty() {
            return Err(Error::Validation("source_url is required".to_string()).into());
        }
        let target = request.target_duration;
        if !target.is_finite()
            || target < self.config.min_target_duration
            || target > self.config.max_target_duration
        {
            return Err(Error::Validation(format!(
                "target_duration must be between {} and {} seconds",
                self.config.min_target_duration, self.config.max_target_duration
            ))
            .into());
        }

        let definitions = request.stages.as_deref().unwrap_or(&self.definitions);
        if definitions.is_empty() {
            return Err(Error::Validation("a run needs at least one stage".to_string()).into());
        }
        let stages = build_stages(definitions);
        validate_stage_list(&stages)?;

        let now = Utc::now();
        let title = request
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| source_url.clone());
        let run = Run {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            source_url,
            target_duration: target,
            status: derive_run_status(&stages),
            created_at: now,
            updated_at: now,
            stages,
            final_outputs: None,
            restarted_from: None,
        };

        self.store.insert_run(&run).await?;
        info!(run_id = %run.id, stages = run.stages.len(), target, "Run created");
        Ok(run)
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Run> {
        self.store
            .load_run(run_id)
            .await?
            .ok_or_else(|| Error::RunNotFound(run_id.to_string()).into())
    }

    pub async fn report(&self, run_id: &str) -> Result<RunReport> {
        Ok(self.get_run(run_id).await?.report())
    }

    pub async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        Ok(self.store.list_runs().await?.iter().map(Run::summary).collect())
    }

    pub async fn stage(&self, run_id: &str, stage_id: &str) -> Result<Stage> {
        let run = self.get_run(run_id).await?;
        find_stage(&run, stage_id).map(|i| run.stages[i].clone())
    }

    /// Move one stage to `running`, `completed` or `error`.
    ///
    /// Applying the same update twice leaves the stored state as after the
    /// first call; the second call writes nothing.
    pub async fn advance_stage(&self, run_id: &str, stage_id: &str, update: StageUpdate) -> Result<Run> {
        let _guard = self.lock(run_id).await;
        let mut run = self.get_run(run_id).await?;
        let index = find_stage(&run, stage_id)?;
        self.apply(&mut run, index, update).await?;
        Ok(run)
    }

    /// Claim the first `pending` or `error` stage and mark it `running`.
    /// Earlier stages are never touched.
    pub async fn resume(&self, run_id: &str) -> Result<(Run, String)> {
        let _guard = self.lock(run_id).await;
        let mut run = self.get_run(run_id).await?;
        if let Some(running) = run.stages.iter().find(|s| s.status == StageStatus::Running) {
            return Err(Error::Conflict(format!("stage {} is already running", running.id)).into());
        }
        let index = run
            .stages
            .iter()
            .position(|s| s.status.is_runnable())
            .ok_or_else(|| PipelineError::NothingToResume(run_id.to_string()))?;

        let stage_id = run.stages[index].id.clone();
        self.apply(&mut run, index, StageUpdate::running()).await?;
        info!(run_id, stage_id = %stage_id, "Run resumed");
        Ok((run, stage_id))
    }

    /// Explicitly (re)run one `pending` or `error` stage. Timestamps and the
    /// previous error are cleared.
    pub async fn run_stage(&self, run_id: &str, stage_id: &str) -> Result<Run> {
        let _guard = self.lock(run_id).await;
        let mut run = self.get_run(run_id).await?;
        let index = find_stage(&run, stage_id)?;

        let status = run.stages[index].status;
        if !status.is_runnable() {
            return Err(Error::InvalidTransition(format!(
                "stage {} is {}; only pending or error stages can be run",
                stage_id, status
            ))
            .into());
        }
        let fresh = run.stages[index].reset();
        run.stages[index] = fresh;
        self.apply(&mut run, index, StageUpdate::running()).await?;
        Ok(run)
    }

    /// Start a new run that keeps every completed stage before `from_order`
    /// and resets the rest. The source run is snapshotted first.
    pub async fn restart_from(&self, run_id: &str, from_order: u32) -> Result<Run> {
        let _guard = self.lock(run_id).await;
        let source = self.get_run(run_id).await?;
        let count = source.stages.len() as u32;
        if from_order < 1 || from_order > count {
            return Err(Error::Validation(format!(
                "from_order must be between 1 and {}",
                count
            ))
            .into());
        }

        let snapshot = self
            .snapshot_locked(
                &source,
                format!("auto before restart from stage {}", from_order),
                None,
                true,
            )
            .await?;

        let stages: Vec<Stage> = source
            .stages
            .iter()
            .map(|s| {
                if s.order < from_order && s.status == StageStatus::Completed {
                    s.clone()
                } else {
                    s.reset()
                }
            })
            .collect();

        let now = Utc::now();
        let run = Run {
            id: uuid::Uuid::new_v4().to_string(),
            title: format!("{} (restart from stage {})", source.title, from_order),
            source_url: source.source_url.clone(),
            target_duration: source.target_duration,
            status: derive_run_status(&stages),
            created_at: now,
            updated_at: now,
            stages,
            final_outputs: None,
            restarted_from: Some(RestartOrigin {
                run_id: source.id.clone(),
                from_order,
                snapshot_id: snapshot.id,
            }),
        };
        self.store.insert_run(&run).await?;
        info!(source = run_id, new_run = %run.id, from_order, "Run restarted");
        Ok(run)
    }

    pub async fn create_snapshot(&self, run_id: &str, note: Option<String>) -> Result<Snapshot> {
        let _guard = self.lock(run_id).await;
        let run = self.get_run(run_id).await?;
        let existing = self.store.list_snapshots(run_id).await?.len();
        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        self.snapshot_locked(&run, format!("v{}", existing + 1), note, false)
            .await
    }

    async fn snapshot_locked(
        &self,
        run: &Run,
        label: String,
        note: Option<String>,
        automatic: bool,
    ) -> Result<Snapshot> {
        // A running stage has no result yet; restoring one would leave the
        // run claimed with nothing executing it.
        let stages: Vec<Stage> = run
            .stages
            .iter()
            .map(|s| if s.status == StageStatus::Running { s.reset() } else { s.clone() })
            .collect();
        let snapshot = Snapshot {
            id: uuid::Uuid::new_v4().to_string(),
            run_id: run.id.clone(),
            label,
            note,
            run_title: run.title.clone(),
            total_stages: run.stages.len(),
            completed_stages: progress(&run.stages).completed,
            automatic,
            stages,
            created_at: Utc::now(),
        };
        self.store.insert_snapshot(&snapshot).await?;
        debug!(run_id = %run.id, snapshot_id = %snapshot.id, label = %snapshot.label, "Snapshot created");
        Ok(snapshot)
    }

    pub async fn list_snapshots(&self, run_id: &str) -> Result<Vec<SnapshotSummary>> {
        self.get_run(run_id).await?;
        Ok(self
            .store
            .list_snapshots(run_id)
            .await?
            .iter()
            .map(SnapshotSummary::from)
            .collect())
    }

    /// Replace the run's stages with the snapshot's copy. Destructive, so
    /// the caller must pass `confirm = true`.
    pub async fn restore_snapshot(&self, run_id: &str, snapshot_id: &str, confirm: bool) -> Result<Run> {
        if !confirm {
            return Err(Error::Validation("restoring a snapshot must be confirmed".to_string()).into());
        }
        let _guard = self.lock(run_id).await;
        let mut run = self.get_run(run_id).await?;
        let snapshot = self
            .store
            .load_snapshot(snapshot_id)
            .await?
            .ok_or_else(|| Error::SnapshotNotFound(snapshot_id.to_string()))?;
        if snapshot.run_id != run.id {
            return Err(Error::Validation(format!(
                "snapshot {} belongs to run {}",
                snapshot_id, snapshot.run_id
            ))
            .into());
        }
        if let Some(running) = run.stages.iter().find(|s| s.status == StageStatus::Running) {
            return Err(Error::Conflict(format!("stage {} is running", running.id)).into());
        }

        run.stages = snapshot.stages;
        run.status = derive_run_status(&run.stages);
        if run.status != RunStatus::Completed {
            run.final_outputs = None;
        }
        run.updated_at = Utc::now();
        self.store.replace_stages(&run).await?;
        info!(run_id, snapshot_id, "Snapshot restored");
        Ok(run)
    }

    /// Replace the output of a completed stage.
    pub async fn update_stage_output(&self, run_id: &str, stage_id: &str, output: Value) -> Result<Stage> {
        let _guard = self.lock(run_id).await;
        let mut run = self.get_run(run_id).await?;
        let index = find_stage(&run, stage_id)?;
        if run.stages[index].status != StageStatus::Completed {
            return Err(Error::InvalidTransition(format!(
                "only completed stages can be edited; {} is {}",
                stage_id, run.stages[index].status
            ))
            .into());
        }

        let now = Utc::now();
        let stage = &mut run.stages[index];
        stage.asset_refs = extract_asset_refs(&output, &self.config.asset_prefix);
        stage.output = Some(output);
        stage.updated_at = now;
        run.updated_at = now;
        let stage = run.stages[index].clone();
        self.store.save_stage(&run, &stage).await?;
        Ok(stage)
    }

    pub async fn set_final_outputs(&self, run_id: &str, outputs: Value) -> Result<Run> {
        let _guard = self.lock(run_id).await;
        let mut run = self.get_run(run_id).await?;
        run.final_outputs = Some(outputs);
        run.updated_at = Utc::now();
        self.store.update_run(&run).await?;
        Ok(run)
    }

    /// Shared transition logic. Caller holds the run lock.
    async fn apply(&self, run: &mut Run, index: usize, update: StageUpdate) -> Result<()> {
        let stage = &run.stages[index];
        match update.status {
            StageStatus::NotImplemented | StageStatus::Pending => {
                return Err(Error::InvalidTransition(format!(
                    "stages cannot be moved to {}",
                    update.status
                ))
                .into());
            }
            _ if stage.status == StageStatus::NotImplemented => {
                return Err(Error::InvalidTransition(format!("stage {} is not implemented", stage.id)).into());
            }
            StageStatus::Running => {
                if let Some(other) = run
                    .stages
                    .iter()
                    .find(|s| s.status == StageStatus::Running && s.id != stage.id)
                {
                    return Err(Error::Conflict(format!("stage {} is already running", other.id)).into());
                }
            }
            _ => {}
        }

        if is_noop(stage, &update) {
            debug!(run_id = %run.id, stage_id = %stage.id, "Stage update is a no-op");
            return Ok(());
        }

        let now = Utc::now();
        let prefix = self.config.asset_prefix.clone();
        let stage = &mut run.stages[index];
        let entering = stage.status != update.status;
        match update.status {
            StageStatus::Running => {
                if entering {
                    stage.started_at.get_or_insert(now);
                    stage.finished_at = None;
                    stage.error = None;
                }
            }
            StageStatus::Completed => {
                if let Some(output) = update.output {
                    stage.asset_refs = extract_asset_refs(&output, &prefix);
                    stage.output = Some(output);
                }
                stage.error = None;
                if entering {
                    stage.finished_at.get_or_insert(now);
                }
            }
            StageStatus::Error => {
                if let Some(output) = update.output {
                    stage.output = Some(output);
                }
                stage.error = Some(
                    update
                        .error
                        .unwrap_or_else(|| StageFailure::new(FailureKind::Internal, "stage failed")),
                );
                if entering {
                    stage.finished_at.get_or_insert(now);
                }
            }
            StageStatus::Pending | StageStatus::NotImplemented => {}
        }
        stage.status = update.status;
        stage.updated_at = now;

        run.status = derive_run_status(&run.stages);
        run.updated_at = now;
        let stage = run.stages[index].clone();
        self.store.save_stage(run, &stage).await?;
        debug!(run_id = %run.id, stage_id = %stage.id, status = %stage.status, run_status = %run.status, "Stage advanced");
        Ok(())
    }
}

fn find_stage(run: &Run, stage_id: &str) -> Result<usize> {
    run.stages
        .iter()
        .position(|s| s.id == stage_id)
        .ok_or_else(|| {
            PipelineError::Core(Error::StageNotFound {
                run_id: run.id.clone(),
                stage_id: stage_id.to_string(),
            })
        })
}

fn is_noop(stage: &Stage, update: &StageUpdate) -> bool {
    stage.status == update.status
        && update.output.as_ref().map_or(true, |o| stage.output.as_ref() == Some(o))
        && update.error.as_ref().map_or(true, |e| stage.error.as_ref() == Some(e))
}
