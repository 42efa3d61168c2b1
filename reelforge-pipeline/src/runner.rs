//! Drives runs through their stages.
//!
//! Stages of one run execute strictly in order: the next stage is claimed
//! only after the previous one's terminal status is persisted. Each run is
//! driven by its own spawned task, so runs proceed independently.

use crate::error::{PipelineError, Result};
use crate::executor::ExecutorRegistry;
use crate::manager::{CreateRun, PipelineManager, StageUpdate};
use reelforge_core::stages::*;
use reelforge_core::{Run, RunStatus, Stage, StageFailure, StageStatus};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How far a drive goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveMode {
    /// Keep going until no pending stage is left or one fails.
    Continue,
    /// Execute only the already-claimed stage.
    Single(String),
}

#[derive(Clone)]
pub struct PipelineRunner {
    manager: Arc<PipelineManager>,
    registry: Arc<ExecutorRegistry>,
}

impl PipelineRunner {
    pub fn new(manager: Arc<PipelineManager>, registry: ExecutorRegistry) -> Self {
        Self {
            manager,
            registry: Arc::new(registry),
        }
    }

    pub fn manager(&self) -> &Arc<PipelineManager> {
        &self.manager
    }

    /// Create a run and start it in the background. Returns immediately.
    pub async fn start(&self, request: CreateRun) -> Result<Run> {
        let run = self.manager.create_run(request).await?;
        self.spawn(run.id.clone(), None, DriveMode::Continue);
        Ok(run)
    }

    /// Claim the first pending or errored stage and continue from there.
    pub async fn resume(&self, run_id: &str) -> Result<Run> {
        let (run, stage_id) = self.manager.resume(run_id).await?;
        self.spawn(run.id.clone(), Some(stage_id), DriveMode::Continue);
        Ok(run)
    }

    /// Execute exactly one pending or errored stage.
    pub async fn run_single(&self, run_id: &str, stage_id: &str) -> Result<Run> {
        let run = self.manager.run_stage(run_id, stage_id).await?;
        self.spawn(
            run.id.clone(),
            Some(stage_id.to_string()),
            DriveMode::Single(stage_id.to_string()),
        );
        Ok(run)
    }

    /// New run from `from_order`, reusing completed earlier stages.
    pub async fn restart(&self, run_id: &str, from_order: u32) -> Result<Run> {
        let run = self.manager.restart_from(run_id, from_order).await?;
        self.spawn(run.id.clone(), None, DriveMode::Continue);
        Ok(run)
    }

    fn spawn(&self, run_id: String, claimed: Option<String>, mode: DriveMode) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.drive(&run_id, claimed, mode).await {
                error!(run_id = %run_id, error = %e, "Run driver stopped");
            }
        })
    }

    /// Execute stages of `run_id` until done or failed. `claimed` is a
    /// stage already moved to `running` by the caller.
    pub async fn drive(&self, run_id: &str, mut claimed: Option<String>, mode: DriveMode) -> Result<RunStatus> {
        loop {
            let run = self.manager.get_run(run_id).await?;
            if run.status == RunStatus::Error && claimed.is_none() {
                info!(run_id, "Run halted on error");
                return Ok(run.status);
            }

            let stage = match claimed.take() {
                Some(id) => run.stage(&id).cloned(),
                None if mode == DriveMode::Continue => {
                    run.stages
                        .iter()
                        .filter(|s| s.status == StageStatus::Pending)
                        .min_by_key(|s| s.order)
                        .cloned()
                }
                None => None,
            };
            let Some(stage) = stage else {
                return self.finish(run).await;
            };

            let run = if stage.status == StageStatus::Running {
                run
            } else {
                self.manager
                    .advance_stage(run_id, &stage.id, StageUpdate::running())
                    .await?
            };

            let update = match self.execute_stage(&run, &stage).await {
                Ok(output) => StageUpdate::completed(output),
                Err(e) => {
                    warn!(run_id, stage_id = %stage.id, fatal = e.is_fatal(), error = %e, "Stage failed");
                    StageUpdate::failed(failure_from(&stage, &e))
                }
            };
            let failed = update.status == StageStatus::Error;
            let run = self.manager.advance_stage(run_id, &stage.id, update).await?;

            if failed {
                return Ok(run.status);
            }
            if let DriveMode::Single(_) = mode {
                return self.finish(run).await;
            }
        }
    }

    async fn execute_stage(&self, run: &Run, stage: &Stage) -> Result<Value> {
        let executor = self
            .registry
            .get(&stage.id)
            .ok_or_else(|| PipelineError::MissingExecutor(stage.id.clone()))?;
        info!(run_id = %run.id, stage_id = %stage.id, order = stage.order, "Executing stage");
        executor.execute(run, stage).await
    }

    async fn finish(&self, run: Run) -> Result<RunStatus> {
        if run.status == RunStatus::Completed && run.final_outputs.is_none() {
            let run = self.manager.set_final_outputs(&run.id, final_outputs(&run)).await?;
            info!(run_id = %run.id, "Run completed");
            return Ok(run.status);
        }
        Ok(run.status)
    }
}

fn failure_from(stage: &Stage, err: &PipelineError) -> StageFailure {
    let mut context = Map::new();
    context.insert("stage".to_string(), json!(stage.id));
    context.insert("fatal".to_string(), json!(err.is_fatal()));
    if let PipelineError::Speech(reelforge_spk::SpeechError::SegmentCountMismatch { expected, actual }) = err {
        context.insert("expected_clips".to_string(), json!(expected));
        context.insert("actual_clips".to_string(), json!(actual));
    }
    if let PipelineError::MissingInput { input, .. } = err {
        context.insert("missing_input".to_string(), json!(input));
    }
    StageFailure::new(err.failure_kind(), err.to_string()).with_context(Value::Object(context))
}

/// Bundle of the deliverables of a completed run.
pub fn final_outputs(run: &Run) -> Value {
    let voice = run.completed_output(VOICE_GENERATION).map(|v| {
        json!({
            "url": v.get("merged_url"),
            "duration": v.get("final_duration"),
            "segments": v.get("segments"),
        })
    });
    json!({
        "script": run.completed_output(SCRIPT_GENERATION).and_then(|o| o.get("text")),
        "hooks": run.completed_output(VIRAL_HOOKS).and_then(|o| o.get("hooks")),
        "timeline": run.completed_output(TIMELINE_CREATION),
        "voice": voice,
    })
}
