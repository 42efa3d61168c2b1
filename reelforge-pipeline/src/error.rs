use reelforge_core::{Error as CoreError, FailureKind};
use reelforge_llm::LLMError;
use reelforge_spk::SpeechError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Text generation failed: {0}")]
    Generation(#[from] LLMError),

    #[error("Speech failed: {0}")]
    Speech(#[from] SpeechError),

    #[error("Content fetch failed: {0}")]
    Fetch(String),

    #[error("Stage {stage} needs {input}, which no completed stage provides")]
    MissingInput { stage: String, input: String },

    #[error("Contract violation: {0}")]
    Contract(String),

    #[error("Unusable collaborator output: {0}")]
    InvalidOutput(String),

    #[error("Nothing to resume in run {0}")]
    NothingToResume(String),

    #[error("No executor registered for stage {0}")]
    MissingExecutor(String),
}

impl PipelineError {
    /// Data-contract violations: retrying the same input cannot succeed.
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::MissingInput { .. } | PipelineError::Contract(_) => true,
            PipelineError::Speech(e) => e.is_fatal(),
            PipelineError::Generation(e) => e.is_configuration(),
            PipelineError::Core(CoreError::Storage(_)) | PipelineError::Core(CoreError::Io(_)) => true,
            _ => false,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PipelineError::Core(CoreError::Storage(_)) | PipelineError::Core(CoreError::Io(_)) => {
                FailureKind::Storage
            }
            PipelineError::MissingExecutor(_) | PipelineError::Core(_) | PipelineError::NothingToResume(_) => {
                FailureKind::Internal
            }
            e if e.is_fatal() => FailureKind::Contract,
            _ => FailureKind::Collaborator,
        }
    }
}

impl From<PipelineError> for CoreError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Core(inner) => inner,
            PipelineError::Speech(inner) => inner.into(),
            PipelineError::NothingToResume(run_id) => {
                CoreError::InvalidTransition(format!("nothing to resume in run {}", run_id))
            }
            e @ (PipelineError::MissingInput { .. } | PipelineError::Contract(_)) => {
                CoreError::Validation(e.to_string())
            }
            other => CoreError::External(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
