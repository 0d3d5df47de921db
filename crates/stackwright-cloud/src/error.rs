//! Engine and provider error types

use crate::resource::{Direction, ResourceKind};
use thiserror::Error;

/// Error codes a provider uses to say "this resource is already there".
const ALREADY_EXISTS_CODES: &[&str] = &[
    "ResourceAlreadyExists",
    "ResourceAlreadyExistsException",
    "EntityAlreadyExists",
    "BucketAlreadyOwnedByYou",
    "QueueAlreadyExists",
    "ResourceInUseException",
];

/// Error codes a provider uses to say "there is nothing to remove".
const NOT_FOUND_CODES: &[&str] = &[
    "ResourceNotFound",
    "ResourceNotFoundException",
    "NoSuchEntity",
    "NoSuchBucket",
    "NotFoundException",
    "AWS.SimpleQueueService.NonExistentQueue",
];

/// Engine errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Unsupported resource type: {0}")]
    UnsupportedResourceType(String),

    #[error("No {direction} handler registered for resource type '{kind}'")]
    HandlerNotFound {
        kind: ResourceKind,
        direction: Direction,
    },

    #[error("Region {region} isn't available for resource {name} ({kind})")]
    RegionUnavailable {
        region: String,
        name: String,
        kind: ResourceKind,
    },

    #[error("Invalid value region: {value}. Resource: {name}")]
    InvalidRegion { name: String, value: String },

    #[error("Invalid resource definition '{name}': {reason}")]
    InvalidResource { name: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock '{name}' is held by {initiator} since {since}")]
    LockHeld {
        name: String,
        initiator: String,
        since: String,
    },

    #[error(
        "Last deployment '{deploy_name}' of bundle '{bundle_name}' failed. \
         Clean its resources or continue the deployment explicitly"
    )]
    PreviousDeployFailed {
        deploy_name: String,
        bundle_name: String,
    },

    #[error(
        "Deploy '{deploy_name}' already has outputs. \
         Clean it first or replace its outputs explicitly"
    )]
    OutputExists { deploy_name: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Errors raised by resource adapters.
///
/// Service errors render the way the remote API reports them
/// (`An error occurred (Code) when calling the Operation operation: ...`),
/// which is the text the retry classifier matches known signatures against.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error(
        "An error occurred ({}) when calling the {operation} operation: {message}",
        .code.as_deref().unwrap_or("Unknown")
    )]
    Service {
        operation: String,
        code: Option<String>,
        message: String,
    },

    #[error("Maximum retries reached for {operation} after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<ProviderError>,
    },

    #[error("All required parameters must be specified! Resource: {name}. Missing: {}", .missing.join(", "))]
    MissingParameters { name: String, missing: Vec<String> },

    #[error("Invalid parameters for {name}: {reason}")]
    InvalidParameters { name: String, reason: String },

    #[error("Operation {operation} is not supported for resource type '{kind}'")]
    Unsupported {
        operation: String,
        kind: ResourceKind,
    },
}

impl ProviderError {
    pub fn service(
        operation: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Service {
            operation: operation.into(),
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// A service error with no structured code, only text.
    pub fn untyped(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            operation: operation.into(),
            code: None,
            message: message.into(),
        }
    }

    pub fn already_exists(operation: impl Into<String>, name: &str) -> Self {
        Self::service(
            operation,
            "ResourceAlreadyExists",
            format!("Resource {} already exists", name),
        )
    }

    pub fn not_found(operation: impl Into<String>, name: &str) -> Self {
        Self::service(
            operation,
            "ResourceNotFoundException",
            format!("Resource {} does not exist", name),
        )
    }

    /// Structured error code, if the provider reported one
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        self.code()
            .is_some_and(|code| ALREADY_EXISTS_CODES.contains(&code))
    }

    pub fn is_not_found(&self) -> bool {
        self.code().is_some_and(|code| NOT_FOUND_CODES.contains(&code))
    }
}
