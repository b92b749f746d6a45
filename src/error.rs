use thiserror::Error;

/// Failures reported by a daemon handle.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("unable to parse docker host `{0}`")]
    InvalidHost(String),

    #[error("invalid API version `{0}`")]
    InvalidApiVersion(String),

    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Failures of the migration engine.
///
/// Only `InvalidPattern` and `SourceUnreachable` raised while selecting abort
/// a whole invocation; the rest are recorded per image or per destination.
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("invalid image pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("source daemon unreachable: {0}")]
    SourceUnreachable(#[source] RuntimeError),

    #[error("failed to read image archive: {0}")]
    ArchiveRead(#[source] RuntimeError),

    #[error("failed to load archive into {destination}: {message}")]
    DestinationLoad { destination: String, message: String },

    #[error("deadline exceeded during {stage}")]
    DeadlineExceeded { stage: String },
}

impl MigrateError {
    pub(crate) fn deadline(stage: impl Into<String>) -> Self {
        MigrateError::DeadlineExceeded {
            stage: stage.into(),
        }
    }
}
