pub mod types;
pub mod error;
pub mod status;
pub mod stages;
pub mod assets;
pub mod config;

pub use error::{Error, Result};
pub use types::{
    FailureKind, Progress, RestartOrigin, Run, RunReport, RunStatus, RunSummary, Snapshot,
    SnapshotSummary, Stage, StageFailure, StageStatus, VoiceSegment,
};
pub use status::{current_stage, derive_run_status, progress, validate_stage_list};
pub use stages::{build_stages, default_stages, StageDefinition};
pub use assets::extract_asset_refs;
pub use config::{ConfigError, ReelforgeConfig};
