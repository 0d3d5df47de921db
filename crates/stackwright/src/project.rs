//! Loaded project: config, provider and state

use anyhow::Context;
use stackwright_cloud::{
    Deployment, Dispatcher, ProjectStateStore, ResourceDescriptor, RetryPolicy,
    default_available_regions, descriptors_from_document,
};
use stackwright_config::StackwrightConfig;
use stackwright_local::{LocalCloud, dispatch_table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// File a build writes into its bundle directory
pub const BUILD_META_FILE: &str = "build_meta.json";

pub struct Project {
    pub config: StackwrightConfig,
    pub root: PathBuf,
}

impl Project {
    /// Load an explicit config file, or discover one.
    pub fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(path) => StackwrightConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => StackwrightConfig::discover().context("No usable stackwright.yaml found")?,
        };
        let root = config.project_path();
        tracing::debug!("Project root: {}", root.display());
        Ok(Self { config, root })
    }

    pub async fn open_state(&self) -> anyhow::Result<ProjectStateStore> {
        Ok(ProjectStateStore::open(&self.root).await?)
    }

    pub fn cloud(&self) -> Arc<LocalCloud> {
        let mut cloud = LocalCloud::new(self.config.local_cloud_path());
        if let Some(account_id) = &self.config.account_id {
            cloud = cloud.with_account_id(account_id.clone());
        }
        Arc::new(cloud)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = &self.config.retry;
        RetryPolicy::new(
            retry.start,
            retry.step,
            retry.count,
            Duration::from_millis(retry.unit_ms),
        )
    }

    pub fn dispatcher(&self) -> Dispatcher {
        let regions = self
            .config
            .available_regions
            .clone()
            .unwrap_or_else(default_available_regions);
        Dispatcher::new(Arc::new(dispatch_table(self.cloud())), &self.config.region)
            .with_available_regions(regions)
            .with_concurrency(self.config.concurrency)
            .with_retry(self.retry_policy())
    }

    pub fn deployment(&self) -> Deployment {
        Deployment::new(self.dispatcher(), &self.root)
    }

    pub fn bundle_dir(&self, bundle: &str) -> PathBuf {
        self.config.output_dir().join(bundle)
    }

    /// Explicit bundle name, or the one of the latest build.
    pub fn resolve_bundle(
        &self,
        store: &ProjectStateStore,
        bundle: Option<String>,
    ) -> anyhow::Result<String> {
        match bundle {
            Some(bundle) => Ok(bundle),
            None => store
                .state()
                .latest_bundle_name()
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("No bundle built yet, run `stackwright build`")),
        }
    }

    pub async fn load_bundle(&self, bundle: &str) -> anyhow::Result<Vec<ResourceDescriptor>> {
        let path = self.bundle_dir(bundle).join(BUILD_META_FILE);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Bundle '{}' not found at {}", bundle, path.display()))?;
        let document = serde_json::from_str(&content)
            .with_context(|| format!("Malformed {}", path.display()))?;
        Ok(descriptors_from_document(document)?)
    }
}
