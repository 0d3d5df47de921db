//! Stackwright deployment engine
//!
//! This crate turns a declarative list of cloud resources into provider
//! calls and tracks what happened in a per-project state file.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │               stackwright CLI                    │
//! │        (deploy / update / clean / sync)          │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │              stackwright-cloud                   │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │  Deployment  │──│ Dispatcher (worker pool)  │ │
//! │  └──────┬───────┘  └──┬─────────┬─────────────┘ │
//! │         │        region::resolve  RetryPolicy   │
//! │  ┌──────▼───────┐  ┌──────────────────────────┐ │
//! │  │ ProjectState │  │ trait ResourceAdapter     │ │
//! │  └──────────────┘  └──────────────────────────┘ │
//! └───────────────────────────┬─────────────────────┘
//!                             │
//!                   ┌─────────▼─────────┐
//!                   │  stackwright-local │
//!                   │     provider       │
//!                   └───────────────────┘
//! ```

pub mod adapter;
pub mod deployment;
pub mod dispatch;
pub mod error;
pub mod output;
pub mod region;
pub mod resource;
pub mod retry;
pub mod state;
pub mod trigger;

// Re-exports
pub use adapter::{ProviderResult, ResourceAdapter, ensure_created, ensure_removed};
pub use deployment::{CleanOptions, DeployOptions, Deployment, RunSummary};
pub use dispatch::{
    BatchResult, DeploymentReport, DispatchTable, Dispatcher, JobOutcome, RunOptions,
};
pub use error::{CloudError, ProviderError, Result};
pub use output::{DeployOutput, OutputStore};
pub use region::{ALL_REGIONS, default_available_regions, resolve};
pub use resource::{
    Description, Direction, RegionSpec, ResourceDescriptor, ResourceFilter, ResourceJob,
    ResourceKind, descriptors_from_document,
};
pub use retry::{RetryPolicy, RetryingAdapter, TransientSignatures};
pub use state::{
    Event, Lock, MODIFICATION_LOCK, ProjectState, ProjectStateStore, StateManager, SyncOutcome,
    WARM_UP_LOCK,
};
pub use trigger::{TriggerJob, TriggerKind, TriggerWiring};
