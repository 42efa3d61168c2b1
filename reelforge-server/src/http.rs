// HTTP API over the pipeline runner

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use reelforge_core::{Error, Run, RunReport, RunSummary, SnapshotSummary, Stage};
use reelforge_pipeline::{CreateRun, PipelineError, PipelineRunner};
use reelforge_spk::{TtsEngine, VoiceInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

#[derive(Clone)]
pub struct ApiState {
    pub runner: PipelineRunner,
    pub engine: Arc<dyn TtsEngine>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRunRequest {
    pub source_url: String,
    pub target_duration: f64,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunAccepted {
    pub run_id: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RestartRequest {
    pub from_order: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RestartAccepted {
    pub new_run_id: String,
    pub source_run_id: String,
    pub from_order: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SnapshotRequest {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RestoreRequest {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StageOutputEdit {
    pub output: Value,
}

/// Error carried back to HTTP clients.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION_ERROR",
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::RunNotFound(_) => (StatusCode::NOT_FOUND, "RUN_NOT_FOUND"),
            Error::StageNotFound { .. } => (StatusCode::NOT_FOUND, "STAGE_NOT_FOUND"),
            Error::SnapshotNotFound(_) => (StatusCode::NOT_FOUND, "SNAPSHOT_NOT_FOUND"),
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Error::InvalidTransition(_) => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "Request failed");
            "An internal error occurred".to_string()
        } else {
            err.to_string()
        };
        Self { status, code, message }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Error::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
            code: self.code.to_string(),
        });
        (self.status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Create HTTP router with all API routes
pub fn create_router(state: ApiState, enable_cors: bool) -> Router {
    let runs = Router::new()
        .route("/api/v1/runs", get(list_runs_handler).post(create_run_handler))
        .route("/api/v1/runs/:id", get(status_handler))
        .route("/api/v1/runs/:id/resume", post(resume_handler))
        .route("/api/v1/runs/:id/restart", post(restart_handler))
        .route(
            "/api/v1/runs/:id/stages/:stage_id",
            get(stage_handler).patch(edit_stage_handler),
        )
        .route("/api/v1/runs/:id/stages/:stage_id/run", post(run_stage_handler))
        .route(
            "/api/v1/runs/:id/snapshots",
            get(list_snapshots_handler).post(create_snapshot_handler),
        )
        .route(
            "/api/v1/runs/:id/snapshots/:snapshot_id/restore",
            post(restore_snapshot_handler),
        )
        .route("/api/v1/voices", get(voices_handler));

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/health", get(health_handler))
        .merge(runs)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };
    router.with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn create_run_handler(
    State(state): State<ApiState>,
    Json(body): Json<CreateRunRequest>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    let run = state
        .runner
        .start(CreateRun {
            source_url: body.source_url,
            target_duration: body.target_duration,
            title: body.title,
            stages: None,
        })
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RunAccepted {
            run_id: run.id,
            status: run.status.to_string(),
        }),
    ))
}

async fn list_runs_handler(State(state): State<ApiState>) -> ApiResult<Json<Vec<RunSummary>>> {
    Ok(Json(state.runner.manager().list_runs().await?))
}

async fn status_handler(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<Json<RunReport>> {
    Ok(Json(state.runner.manager().report(&id).await?))
}

async fn resume_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<RunReport>)> {
    let run = state.runner.resume(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(run.report())))
}

async fn restart_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<RestartRequest>,
) -> ApiResult<(StatusCode, Json<RestartAccepted>)> {
    let run: Run = state.runner.restart(&id, body.from_order).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(RestartAccepted {
            new_run_id: run.id,
            source_run_id: id,
            from_order: body.from_order,
        }),
    ))
}

async fn stage_handler(
    State(state): State<ApiState>,
    Path((id, stage_id)): Path<(String, String)>,
) -> ApiResult<Json<Stage>> {
    Ok(Json(state.runner.manager().stage(&id, &stage_id).await?))
}

async fn edit_stage_handler(
    State(state): State<ApiState>,
    Path((id, stage_id)): Path<(String, String)>,
    Json(body): Json<StageOutputEdit>,
) -> ApiResult<Json<Stage>> {
    if body.output.is_null() {
        return Err(ApiError::bad_request("output is required"));
    }
    let stage = state
        .runner
        .manager()
        .update_stage_output(&id, &stage_id, body.output)
        .await?;
    Ok(Json(stage))
}

async fn run_stage_handler(
    State(state): State<ApiState>,
    Path((id, stage_id)): Path<(String, String)>,
) -> ApiResult<(StatusCode, Json<RunReport>)> {
    let run = state.runner.run_single(&id, &stage_id).await?;
    Ok((StatusCode::ACCEPTED, Json(run.report())))
}

async fn list_snapshots_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<SnapshotSummary>>> {
    Ok(Json(state.runner.manager().list_snapshots(&id).await?))
}

async fn create_snapshot_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Option<Json<SnapshotRequest>>,
) -> ApiResult<(StatusCode, Json<SnapshotSummary>)> {
    let note = body.and_then(|Json(b)| b.note);
    let snapshot = state.runner.manager().create_snapshot(&id, note).await?;
    Ok((StatusCode::CREATED, Json(SnapshotSummary::from(&snapshot))))
}

async fn restore_snapshot_handler(
    State(state): State<ApiState>,
    Path((id, snapshot_id)): Path<(String, String)>,
    body: Option<Json<RestoreRequest>>,
) -> ApiResult<Json<RunReport>> {
    let confirm = body.map(|Json(b)| b.confirm).unwrap_or(false);
    let run = state
        .runner
        .manager()
        .restore_snapshot(&id, &snapshot_id, confirm)
        .await?;
    Ok(Json(run.report()))
}

async fn voices_handler(State(state): State<ApiState>) -> ApiResult<Json<Vec<VoiceInfo>>> {
    match state.engine.list_voices().await {
        Ok(voices) => Ok(Json(voices)),
        Err(e) => {
            warn!(engine = state.engine.name(), error = %e, "Voice listing failed");
            Err(ApiError {
                status: StatusCode::BAD_GATEWAY,
                code: "SPEECH_ENGINE_ERROR",
                message: e.to_string(),
            })
        }
    }
}
