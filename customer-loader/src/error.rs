use crate::keys::ResourceKind;
use thiserror::Error;

/// Failures reported by a [`Backend`](crate::backend::Backend).
///
/// Clonable so one failed fetch can be handed to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("{resource} {id} not found")]
    NotFound { resource: ResourceKind, id: u64 },
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] figment::Error),
    #[error("Invalid log level: {0}")]
    LogLevel(#[from] log::ParseLevelError),
    #[error("Failed to read fixtures: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Backend(#[from] BackendError),
}
