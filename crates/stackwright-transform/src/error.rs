use stackwright_cloud::{CloudError, ProviderError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Invalid '{key}' of {name}: {reason}")]
    InvalidParameter {
        name: String,
        key: String,
        reason: String,
    },

    #[error("{kind} '{target}' referenced by {name} is not present in the template")]
    MissingReference {
        name: String,
        kind: String,
        target: String,
    },

    #[error("Duplicate logical id in template: {0}")]
    DuplicateResource(String),

    #[error("Resources '{first}' and '{second}' both map to logical id {logic_name}")]
    LogicNameCollision {
        logic_name: String,
        first: String,
        second: String,
    },

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, TransformError>;

impl TransformError {
    pub fn invalid(name: &str, key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
