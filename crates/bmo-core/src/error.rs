//! Errors surfaced by the chat service.

use std::path::PathBuf;
use thiserror::Error;

use bmo_local_ai::LocalAIError;

use crate::host::ServiceState;

/// Errors from the chat service.
///
/// Only `ModelNotFound`, `LoadFailure` and `AlreadyInitialized` come out of
/// initialization. `Generation` never escapes [`ChatService::generate`]; it
/// is turned into a degraded reply there.
///
/// [`ChatService::generate`]: crate::ChatService::generate
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no model file found (searched: {})", format_paths(.searched))]
    ModelNotFound { searched: Vec<PathBuf> },
    #[error("failed to load model: {0}")]
    LoadFailure(#[source] LocalAIError),
    #[error("generation failed: {0}")]
    Generation(#[source] LocalAIError),
    #[error("BMO is not ready yet (state: {0})")]
    ServiceNotReady(ServiceState),
    #[error("model host already initialized (state: {0})")]
    AlreadyInitialized(ServiceState),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ChatError {
    /// Whether this error must stop the process from serving.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChatError::ModelNotFound { .. } | ChatError::LoadFailure(_)
        )
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
