//! reelforge-pipeline: the staged production pipeline
//!
//! `PipelineManager` owns run and stage state transitions and snapshots.
//! `PipelineRunner` drives runs by dispatching each stage to the
//! `StageExecutor` registered for it.

pub mod error;
pub mod manager;
pub mod executor;
pub mod executors;
pub mod timeline;
pub mod content;
pub mod runner;

pub use error::{PipelineError, Result};
pub use manager::{CreateRun, PipelineManager, StageUpdate};
pub use executor::{output_str, ExecutorRegistry, StageExecutor};
pub use executors::standard_registry;
pub use timeline::{create_timeline, to_srt, to_vtt, validate_timeline, Timeline, TimelineSegment};
pub use content::{ContentSource, HttpContentSource, PageContent};
pub use runner::{final_outputs, DriveMode, PipelineRunner};
