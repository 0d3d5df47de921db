//! Project state
//!
//! The project state file (`.stackwright/state.yaml`) records the project
//! name, known lambdas, named locks, a pruned log of execution events and a
//! snapshot of the latest deploy.
//!
//! [`ProjectState`] holds the pure model: every method that depends on the
//! current time takes it as a parameter. [`ProjectStateStore`] binds a state
//! to its file and persists every mutation.

mod store;
mod sync;

pub use store::{ProjectStateStore, StateManager, current_user};
pub use sync::{SyncOutcome, actualize_latest_deploy, merge_events, reconcile, reconcile_locks};

use crate::error::{CloudError, Result};
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MODIFICATION_LOCK: &str = "modification_lock";
pub const WARM_UP_LOCK: &str = "warm_up_lock";

/// Events older than this many days are candidates for pruning
pub const KEEP_EVENTS_DAYS: i64 = 30;
/// Pruning never drops below this many events
pub const LEAVE_LATEST_EVENTS: usize = 20;

pub mod operation {
    pub const BUILD: &str = "build";
    pub const PACKAGE_META: &str = "package_meta";
    pub const DEPLOY: &str = "deploy";
    pub const UPDATE: &str = "update";
    pub const CLEAN: &str = "clean";
}

/// Default source folder per runtime
pub const BUILD_MAPPINGS: &[(&str, &str)] = &[
    ("java", "jsrc/main/java"),
    ("python", "src"),
    ("nodejs", "app"),
];

pub fn default_build_path(runtime: &str) -> Option<&'static str> {
    BUILD_MAPPINGS
        .iter()
        .find(|(r, _)| *r == runtime)
        .map(|(_, path)| *path)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaInfo {
    pub runtime: String,
}

/// Named lock record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub locked: bool,
    pub last_modification_date: DateTime<Utc>,
    pub initiator: String,
}

/// One entry of the execution log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub operation: String,
    pub time_start: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: IndexMap<String, Value>,
}

impl Event {
    pub fn new(operation: impl Into<String>, time_start: DateTime<Utc>) -> Self {
        Self {
            operation: operation.into(),
            time_start,
            fields: IndexMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Null, empty strings and empty collections carry no information.
/// Booleans are kept: a `false` operation status is meaningful.
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub name: String,

    #[serde(default)]
    pub lambdas: IndexMap<String, LambdaInfo>,

    #[serde(default)]
    pub locks: IndexMap<String, Lock>,

    /// Newest first
    #[serde(default)]
    pub events: Vec<Event>,

    /// Fields of the latest deploy event; empty after a clean
    #[serde(default)]
    pub latest_deploy: IndexMap<String, Value>,

    #[serde(default)]
    pub build_projects_mapping: IndexMap<String, String>,
}

impl ProjectState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lambdas: IndexMap::new(),
            locks: IndexMap::new(),
            events: Vec::new(),
            latest_deploy: IndexMap::new(),
            build_projects_mapping: IndexMap::new(),
        }
    }

    /// Deploy name derived from the project name.
    ///
    /// `my_project` and `MyProject` both become `my-project`.
    pub fn default_deploy_name(&self) -> String {
        default_deploy_name(&self.name)
    }

    pub fn is_lock_free(&self, name: &str) -> bool {
        self.locks.get(name).is_none_or(|lock| !lock.locked)
    }

    /// Stamp a lock transition.
    pub fn set_lock(
        &mut self,
        name: &str,
        locked: bool,
        initiator: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.locks.insert(
            name.to_string(),
            Lock {
                locked,
                last_modification_date: now,
                initiator: initiator.into(),
            },
        );
    }

    /// Take `name`, failing when somebody already holds it.
    pub fn acquire_lock(
        &mut self,
        name: &str,
        initiator: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(lock) = self.locks.get(name).filter(|lock| lock.locked) {
            return Err(CloudError::LockHeld {
                name: name.to_string(),
                initiator: lock.initiator.clone(),
                since: lock.last_modification_date.to_rfc3339(),
            });
        }
        self.set_lock(name, true, initiator, now);
        Ok(())
    }

    pub fn release_lock(&mut self, name: &str, initiator: impl Into<String>, now: DateTime<Utc>) {
        self.set_lock(name, false, initiator, now);
    }

    pub fn add_lambda(&mut self, name: impl Into<String>, runtime: impl Into<String>) {
        self.lambdas.insert(
            name.into(),
            LambdaInfo {
                runtime: runtime.into(),
            },
        );
    }

    /// Record where sources for `runtime` live; known runtimes have a default.
    pub fn add_build_mapping(&mut self, runtime: &str, path: Option<&str>) -> Result<()> {
        let path = path
            .or_else(|| default_build_path(runtime))
            .ok_or_else(|| {
                CloudError::InvalidConfig(format!(
                    "No default build path for runtime '{}'",
                    runtime
                ))
            })?;
        self.build_projects_mapping
            .insert(runtime.to_string(), path.to_string());
        Ok(())
    }

    /// Append an event, refresh derived fields and prune.
    pub fn log_event(&mut self, mut event: Event, now: DateTime<Utc>) {
        event.fields.retain(|_, value| !is_empty_value(value));

        match event.operation.as_str() {
            operation::DEPLOY => {
                let mut latest = IndexMap::new();
                latest.insert(
                    "time_start".to_string(),
                    Value::String(event.time_start.to_rfc3339()),
                );
                latest.extend(event.fields.clone());
                self.latest_deploy = latest;
            }
            operation::CLEAN => self.latest_deploy.clear(),
            _ => {}
        }

        self.events.insert(0, event);
        self.prune_events(now);
    }

    /// Keep events newest first and drop the ones past retention.
    ///
    /// Events older than [`KEEP_EVENTS_DAYS`] are dropped, but never below
    /// [`LEAVE_LATEST_EVENTS`] entries.
    pub fn prune_events(&mut self, now: DateTime<Utc>) {
        self.events.sort_by(|a, b| b.time_start.cmp(&a.time_start));
        let cutoff = now - Duration::days(KEEP_EVENTS_DAYS);
        if let Some(index) = self.events.iter().position(|e| e.time_start < cutoff) {
            let keep = index.max(LEAVE_LATEST_EVENTS);
            if keep < self.events.len() {
                tracing::debug!("Pruning {} old event(s)", self.events.len() - keep);
            }
            self.events.truncate(keep);
        }
    }

    /// Most recent event of `operation`
    pub fn latest_event(&self, operation: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.operation == operation)
    }

    /// Attribute of the most recent event of `operation`
    pub fn latest_attribute(&self, operation: &str, key: &str) -> Option<&Value> {
        self.latest_event(operation).and_then(|e| e.fields.get(key))
    }

    /// Most recent deploy, update or clean
    pub fn latest_modification(&self) -> Option<&Event> {
        self.events.iter().find(|e| {
            matches!(
                e.operation.as_str(),
                operation::DEPLOY | operation::UPDATE | operation::CLEAN
            )
        })
    }

    /// Bundle of the latest build, falling back to the latest package_meta.
    pub fn latest_bundle_name(&self) -> Option<&str> {
        [operation::BUILD, operation::PACKAGE_META]
            .iter()
            .find_map(|op| self.latest_attribute(op, "bundle_name").and_then(Value::as_str))
    }

    pub fn latest_deployed_bundle_name(&self) -> Option<&str> {
        self.latest_deploy.get("bundle_name").and_then(Value::as_str)
    }

    pub fn latest_deployed_deploy_name(&self) -> Option<&str> {
        self.latest_deploy.get("deploy_name").and_then(Value::as_str)
    }

    /// Start of the latest deploy, if one is recorded
    pub fn latest_deploy_time(&self) -> Option<DateTime<Utc>> {
        self.latest_deploy
            .get("time_start")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    /// True when the latest deploy recorded a failed status
    pub fn latest_deploy_failed(&self) -> bool {
        self.latest_deploy.get("operation_status") == Some(&Value::Bool(false))
    }
}

/// `snake_name` and `CamelName` both map to lowercase dash-separated words.
pub fn default_deploy_name(project_name: &str) -> String {
    let words: Vec<String> = if project_name.contains('_') {
        project_name
            .split('_')
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect()
    } else {
        let mut words: Vec<String> = Vec::new();
        for ch in project_name.chars() {
            match words.last_mut() {
                Some(word) if !ch.is_uppercase() => word.push(ch),
                _ => words.push(ch.to_string()),
            }
        }
        words.iter().map(|w| w.to_lowercase()).collect()
    };
    words.join("-")
}
