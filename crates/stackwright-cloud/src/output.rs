//! Deploy outputs
//!
//! After every deploy the descriptions of all successfully created resources
//! are written to `.stackwright/outputs/<deploy_name>.json`. Clean reads them
//! back to know what to remove.

use crate::error::{CloudError, Result};
use crate::resource::{Description, ResourceJob};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const OUTPUT_VERSION: u32 = 1;
const OUTPUTS_DIR: &str = ".stackwright/outputs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployOutput {
    pub version: u32,
    pub deploy_name: String,
    pub bundle_name: String,
    pub updated_at: DateTime<Utc>,

    /// Descriptions keyed by `kind:name:region`
    pub resources: IndexMap<String, Description>,
}

impl DeployOutput {
    pub fn new(deploy_name: impl Into<String>, bundle_name: impl Into<String>) -> Self {
        Self {
            version: OUTPUT_VERSION,
            deploy_name: deploy_name.into(),
            bundle_name: bundle_name.into(),
            updated_at: Utc::now(),
            resources: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, description: Description) {
        self.resources.insert(description.key(), description);
        self.updated_at = Utc::now();
    }

    pub fn remove(&mut self, key: &str) -> Option<Description> {
        let removed = self.resources.shift_remove(key);
        if removed.is_some() {
            self.updated_at = Utc::now();
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Jobs that recreate (or remove) every recorded resource
    pub fn jobs(&self) -> Vec<ResourceJob> {
        self.resources.values().map(Description::to_job).collect()
    }
}

/// Reads and writes deploy outputs of one project
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        Self {
            dir: project_root.as_ref().join(OUTPUTS_DIR),
        }
    }

    fn path(&self, deploy_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", deploy_name))
    }

    pub async fn load(&self, deploy_name: &str) -> Result<Option<DeployOutput>> {
        let path = self.path(deploy_name);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        let output: DeployOutput = serde_json::from_str(&content)?;
        if output.version > OUTPUT_VERSION {
            return Err(CloudError::StateError(format!(
                "Output version {} is newer than supported version {}",
                output.version, OUTPUT_VERSION
            )));
        }
        tracing::debug!(
            "Loaded {} output(s) of deploy '{}'",
            output.resources.len(),
            deploy_name
        );
        Ok(Some(output))
    }

    pub async fn save(&self, output: &DeployOutput) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).await?;
        }
        let content = serde_json::to_string_pretty(output)?;
        fs::write(self.path(&output.deploy_name), content).await?;
        tracing::debug!(
            "Saved {} output(s) of deploy '{}'",
            output.resources.len(),
            output.deploy_name
        );
        Ok(())
    }

    pub async fn delete(&self, deploy_name: &str) -> Result<bool> {
        let path = self.path(deploy_name);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path).await?;
        Ok(true)
    }
}
