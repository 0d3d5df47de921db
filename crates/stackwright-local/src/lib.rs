//! File-backed local provider for Stackwright
//!
//! Implements the resource adapter contract for every resource kind by
//! storing JSON records on disk, so deployments can run end to end without
//! a cloud account.
//!
//! # Example
//!
//! ```ignore
//! use stackwright_cloud::Dispatcher;
//! use stackwright_local::{LocalCloud, dispatch_table};
//! use std::sync::Arc;
//!
//! let cloud = Arc::new(LocalCloud::new(".stackwright/local"));
//! let dispatcher = Dispatcher::new(Arc::new(dispatch_table(cloud)), "eu-west-1");
//! ```

pub mod cloud;
pub mod error;
pub mod provider;

pub use cloud::{LocalCloud, ResourceRecord};
pub use error::{LocalError, Result};
pub use provider::{LocalAdapter, LocalTriggerWiring};

use stackwright_cloud::{DispatchTable, ResourceKind, TriggerKind};
use std::sync::Arc;

/// Dispatch table with a local adapter for every kind and trigger
pub fn dispatch_table(cloud: Arc<LocalCloud>) -> DispatchTable {
    let mut table = DispatchTable::new();
    for kind in ResourceKind::ALL {
        table.register(kind, Arc::new(LocalAdapter::new(cloud.clone(), kind)));
    }
    let wiring = Arc::new(LocalTriggerWiring::new(cloud));
    for kind in TriggerKind::ALL {
        table.register_trigger(kind, wiring.clone());
    }
    table
}
