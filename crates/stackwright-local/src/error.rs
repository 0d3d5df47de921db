//! Local provider error types

use stackwright_cloud::{ProviderError, ResourceKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalError {
    #[error("{kind} {name} already exists in {region}")]
    AlreadyExists {
        kind: ResourceKind,
        name: String,
        region: String,
    },

    #[error("{kind} {name} not found in {region}")]
    NotFound {
        kind: ResourceKind,
        name: String,
        region: String,
    },

    #[error("Corrupted record {path}: {reason}")]
    InvalidRecord { path: String, reason: String },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LocalError>;

impl LocalError {
    /// Render as a provider error for `operation`, keeping the idempotency
    /// codes the engine relies on.
    pub fn into_provider(self, operation: &str) -> ProviderError {
        match self {
            LocalError::AlreadyExists { ref name, .. } => {
                ProviderError::already_exists(operation, name)
            }
            LocalError::NotFound { ref name, .. } => ProviderError::not_found(operation, name),
            other => ProviderError::untyped(operation, other.to_string()),
        }
    }
}
