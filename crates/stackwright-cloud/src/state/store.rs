//! Persistence of the project state file

use super::{Event, ProjectState};
use crate::error::{CloudError, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_DIR: &str = ".stackwright";
const STATE_FILE: &str = "state.yaml";
const BACKUP_SUFFIX: &str = "backup";

/// Reads and writes one state file, keeping a backup of the previous copy
#[derive(Debug, Clone)]
pub struct StateManager {
    path: PathBuf,
}

impl StateManager {
    /// State file inside a project (`<root>/.stackwright/state.yaml`)
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        Self::new(project_root.as_ref().join(STATE_DIR).join(STATE_FILE))
    }

    /// State file at an arbitrary location (e.g. a shared remote copy)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".");
        name.push(BACKUP_SUFFIX);
        PathBuf::from(name)
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the state, `None` when the file doesn't exist
    pub async fn load(&self) -> Result<Option<ProjectState>> {
        if !self.path.exists() {
            tracing::debug!("State file not found: {}", self.path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).await?;
        let state: ProjectState = serde_yaml::from_str(&content).map_err(|e| {
            CloudError::StateError(format!("{}: {}", self.path.display(), e))
        })?;

        tracing::debug!(
            "Loaded state of '{}' with {} event(s)",
            state.name,
            state.events.len()
        );
        Ok(Some(state))
    }

    pub async fn save(&self, state: &ProjectState) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).await?;
                tracing::debug!("Created state directory: {}", dir.display());
            }
        }

        if self.path.exists() {
            fs::copy(&self.path, self.backup_path()).await?;
        }

        let content = serde_yaml::to_string(state)?;
        fs::write(&self.path, content).await?;

        tracing::debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}

/// Name of the user running the process
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Project state bound to its file. Every mutation is persisted before the
/// method returns.
#[derive(Debug)]
pub struct ProjectStateStore {
    manager: StateManager,
    state: ProjectState,
    initiator: String,
}

impl ProjectStateStore {
    /// Create the state file for a new project.
    pub async fn init(project_root: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        let manager = StateManager::for_project(project_root);
        if manager.exists() {
            return Err(CloudError::StateError(format!(
                "Project state already exists: {}",
                manager.path().display()
            )));
        }
        let store = Self {
            manager,
            state: ProjectState::new(name),
            initiator: current_user(),
        };
        store.save().await?;
        tracing::info!("Initialized project state '{}'", store.state.name);
        Ok(store)
    }

    /// Load the state of an initialized project.
    pub async fn open(project_root: impl AsRef<Path>) -> Result<Self> {
        let manager = StateManager::for_project(project_root);
        let state = manager.load().await?.ok_or_else(|| {
            CloudError::StateError(format!(
                "No project state at {}, run init first",
                manager.path().display()
            ))
        })?;
        Ok(Self {
            manager,
            state,
            initiator: current_user(),
        })
    }

    pub fn with_initiator(mut self, initiator: impl Into<String>) -> Self {
        self.initiator = initiator.into();
        self
    }

    pub fn state(&self) -> &ProjectState {
        &self.state
    }

    pub fn manager(&self) -> &StateManager {
        &self.manager
    }

    pub fn initiator(&self) -> &str {
        &self.initiator
    }

    pub(super) fn state_mut(&mut self) -> &mut ProjectState {
        &mut self.state
    }

    pub async fn save(&self) -> Result<()> {
        self.manager.save(&self.state).await
    }

    /// Re-read the file, dropping in-memory changes.
    pub async fn reload(&mut self) -> Result<&ProjectState> {
        if let Some(state) = self.manager.load().await? {
            self.state = state;
        }
        Ok(&self.state)
    }

    pub async fn acquire_lock(&mut self, name: &str) -> Result<&ProjectState> {
        self.state.acquire_lock(name, self.initiator.clone(), Utc::now())?;
        self.save().await?;
        tracing::debug!("Acquired lock {}", name);
        Ok(&self.state)
    }

    pub async fn release_lock(&mut self, name: &str) -> Result<&ProjectState> {
        self.state.release_lock(name, self.initiator.clone(), Utc::now());
        self.save().await?;
        tracing::debug!("Released lock {}", name);
        Ok(&self.state)
    }

    pub async fn log_event(&mut self, event: Event) -> Result<&ProjectState> {
        tracing::debug!("Logging {} event", event.operation);
        self.state.log_event(event, Utc::now());
        self.save().await?;
        Ok(&self.state)
    }

    pub async fn add_lambda(&mut self, name: &str, runtime: &str) -> Result<&ProjectState> {
        self.state.add_lambda(name, runtime);
        self.save().await?;
        Ok(&self.state)
    }

    pub async fn add_build_mapping(
        &mut self,
        runtime: &str,
        path: Option<&str>,
    ) -> Result<&ProjectState> {
        self.state.add_build_mapping(runtime, path)?;
        self.save().await?;
        Ok(&self.state)
    }
}
