//! Error types for the prompt cache, the generation backends and the pipeline.
//!
//! Cache errors never leave the pipeline: they are recovered locally. Only
//! [`PipelineError`] reaches the user.

use std::path::PathBuf;
use thiserror::Error;

/// Failures of a single cache slot operation.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("no prompt cache at {0}")]
    NotFound(PathBuf),

    #[error("prompt cache at {path} is unusable: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    #[error("prompt cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures reported by a generation backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerateError {
    /// The supplied computation state was rejected by the backend.
    #[error("backend rejected the cached state: {0}")]
    StateInvalid(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("{0}")]
    Failed(String),
}

impl GenerateError {
    /// Whether a retry with a fresh state could fix this failure.
    pub fn is_state_invalid(&self) -> bool {
        matches!(self, Self::StateInvalid(_))
    }
}

/// Fatal outcomes of a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("could not reach backend '{backend}': {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("generation failed on backend '{backend}': {reason}")]
    GenerationFailed { backend: String, reason: String },

    #[error("nothing to do: the request is empty")]
    EmptyRequest,
}

impl PipelineError {
    pub(crate) fn from_generate(backend: &str, err: GenerateError) -> Self {
        match err {
            GenerateError::BackendUnavailable(reason) => Self::BackendUnavailable {
                backend: backend.to_string(),
                reason,
            },
            other => Self::GenerationFailed {
                backend: backend.to_string(),
                reason: other.to_string(),
            },
        }
    }
}
