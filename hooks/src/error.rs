//! Errors that abort hook loading

use crate::config::ConfigError;
use crate::worker::WorkerError;
use std::path::PathBuf;

/// Fatal errors of [`crate::orchestrator::add_hooks`]
///
/// Per-hook failures never surface here; they are recorded on the
/// transaction instead.
#[derive(Debug, thiserror::Error)]
pub enum HooksError {
    #[error("invalid hookfiles pattern '{pattern}': {cause}")]
    Resolution { pattern: String, cause: String },

    #[error("failed to read hook file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to evaluate hooks from '{unit}': {message}")]
    Evaluation { unit: String, message: String },

    #[error("{0} is not implemented")]
    NotImplemented(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start hook worker: {0}")]
    Worker(#[from] WorkerError),
}

impl HooksError {
    pub(crate) fn evaluation(unit: impl Into<String>, message: impl std::fmt::Display) -> Self {
        HooksError::Evaluation {
            unit: unit.into(),
            message: message.to_string(),
        }
    }
}
