use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Stage not found: {run_id}/{stage_id}")]
    StageNotFound { run_id: String, stage_id: String },

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("External service error: {0}")]
    External(String),
}

impl Error {
    /// True for errors caused by the caller (bad ids, illegal state changes),
    /// as opposed to infrastructure failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::RunNotFound(_)
                | Error::StageNotFound { .. }
                | Error::SnapshotNotFound(_)
                | Error::InvalidTransition(_)
                | Error::Validation(_)
                | Error::Conflict(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Error::Deserialization(err.to_string())
        } else {
            Error::Serialization(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
