//! Deploy, update and clean runs
//!
//! Each run takes the modification lock, drives the dispatcher, records the
//! outputs and an execution event, and releases the lock again even when
//! the run itself fails.

use crate::dispatch::{DeploymentReport, Dispatcher, RunOptions};
use crate::error::{CloudError, Result};
use crate::output::{DeployOutput, OutputStore};
use crate::resource::{Direction, ResourceDescriptor, ResourceFilter};
use crate::state::{Event, MODIFICATION_LOCK, ProjectStateStore, operation};
use chrono::Utc;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub deploy_name: String,
    pub bundle_name: String,
    /// Deploy on top of a failed previous deploy, keeping its outputs
    pub continue_deploy: bool,
    /// Start a fresh output file when the deploy name already has one
    pub replace_output: bool,
    pub halt_on_failure: bool,
    pub filter: ResourceFilter,
}

impl DeployOptions {
    pub fn new(deploy_name: impl Into<String>, bundle_name: impl Into<String>) -> Self {
        Self {
            deploy_name: deploy_name.into(),
            bundle_name: bundle_name.into(),
            continue_deploy: false,
            replace_output: false,
            halt_on_failure: true,
            filter: ResourceFilter::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CleanOptions {
    pub deploy_name: String,
    /// Keep the output file even when everything was removed
    pub preserve_output: bool,
    pub filter: ResourceFilter,
}

impl CleanOptions {
    pub fn new(deploy_name: impl Into<String>) -> Self {
        Self {
            deploy_name: deploy_name.into(),
            preserve_output: false,
            filter: ResourceFilter::default(),
        }
    }
}

/// Result of a finished run
#[derive(Debug)]
pub struct RunSummary {
    pub operation: &'static str,
    pub deploy_name: String,
    pub bundle_name: String,
    pub report: DeploymentReport,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.report.is_success()
    }
}

/// Runs deployments of one project
pub struct Deployment {
    dispatcher: Dispatcher,
    outputs: OutputStore,
}

impl Deployment {
    pub fn new(dispatcher: Dispatcher, project_root: impl AsRef<Path>) -> Self {
        Self {
            dispatcher,
            outputs: OutputStore::for_project(project_root),
        }
    }

    pub fn outputs(&self) -> &OutputStore {
        &self.outputs
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Create every descriptor in deploy priority order.
    pub async fn deploy(
        &self,
        store: &mut ProjectStateStore,
        descriptors: &[ResourceDescriptor],
        options: &DeployOptions,
    ) -> Result<RunSummary> {
        let state = store.state();
        if state.latest_deploy_failed()
            && state.latest_deployed_deploy_name() == Some(options.deploy_name.as_str())
            && !options.continue_deploy
        {
            return Err(CloudError::PreviousDeployFailed {
                deploy_name: options.deploy_name.clone(),
                bundle_name: state
                    .latest_deployed_bundle_name()
                    .unwrap_or_default()
                    .to_string(),
            });
        }

        if !options.continue_deploy
            && !options.replace_output
            && self.outputs.load(&options.deploy_name).await?.is_some()
        {
            return Err(CloudError::OutputExists {
                deploy_name: options.deploy_name.clone(),
            });
        }

        let descriptors = options.filter.apply(descriptors);
        let time_start = Utc::now();
        store.acquire_lock(MODIFICATION_LOCK).await?;
        let result = self.run_deploy(&descriptors, options).await;
        let result = match result {
            Ok(report) => {
                let event = Event::new(operation::DEPLOY, time_start)
                    .with_field("bundle_name", options.bundle_name.as_str())
                    .with_field("deploy_name", options.deploy_name.as_str())
                    .with_field("time_end", Utc::now().to_rfc3339())
                    .with_field("operation_status", report.is_success());
                store.log_event(event).await.map(|_| report)
            }
            Err(err) => Err(err),
        };
        store.release_lock(MODIFICATION_LOCK).await?;

        let report = result?;
        Ok(RunSummary {
            operation: operation::DEPLOY,
            deploy_name: options.deploy_name.clone(),
            bundle_name: options.bundle_name.clone(),
            report,
        })
    }

    async fn run_deploy(
        &self,
        descriptors: &[ResourceDescriptor],
        options: &DeployOptions,
    ) -> Result<DeploymentReport> {
        let report = self
            .dispatcher
            .run(
                Direction::Create,
                descriptors,
                RunOptions {
                    halt_on_failure: options.halt_on_failure,
                },
            )
            .await?;

        let mut output = match self.outputs.load(&options.deploy_name).await? {
            Some(existing) if options.continue_deploy => existing,
            _ => DeployOutput::new(&options.deploy_name, &options.bundle_name),
        };
        for description in report.descriptions() {
            output.insert(description.clone());
        }
        self.outputs.save(&output).await?;

        tracing::info!(
            "Deploy '{}': {} succeeded, {} failed",
            options.deploy_name,
            report.succeeded_count(),
            report.failed_count()
        );
        Ok(report)
    }

    /// Update the kinds that support it, in update priority order.
    pub async fn update(
        &self,
        store: &mut ProjectStateStore,
        descriptors: &[ResourceDescriptor],
        options: &DeployOptions,
    ) -> Result<RunSummary> {
        let Some(mut output) = self.outputs.load(&options.deploy_name).await? else {
            return Err(CloudError::StateError(format!(
                "Deploy '{}' has no outputs, deploy it before updating",
                options.deploy_name
            )));
        };

        let descriptors = options.filter.apply(descriptors);
        let time_start = Utc::now();
        store.acquire_lock(MODIFICATION_LOCK).await?;
        let result = self
            .dispatcher
            .run(
                Direction::Update,
                &descriptors,
                RunOptions {
                    halt_on_failure: options.halt_on_failure,
                },
            )
            .await;
        let result = match result {
            Ok(report) => {
                for description in report.descriptions() {
                    output.insert(description.clone());
                }
                let saved = self.outputs.save(&output).await;
                let event = Event::new(operation::UPDATE, time_start)
                    .with_field("bundle_name", options.bundle_name.as_str())
                    .with_field("deploy_name", options.deploy_name.as_str())
                    .with_field("time_end", Utc::now().to_rfc3339())
                    .with_field("operation_status", report.is_success());
                match saved {
                    Ok(()) => store.log_event(event).await.map(|_| report),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        };
        store.release_lock(MODIFICATION_LOCK).await?;

        Ok(RunSummary {
            operation: operation::UPDATE,
            deploy_name: options.deploy_name.clone(),
            bundle_name: options.bundle_name.clone(),
            report: result?,
        })
    }

    /// Remove what the deploy's outputs record, in clean order.
    ///
    /// Failures don't stop the run; resources that couldn't be removed, or
    /// that the filter left out, stay in the outputs.
    pub async fn clean(
        &self,
        store: &mut ProjectStateStore,
        options: &CleanOptions,
    ) -> Result<RunSummary> {
        let Some(mut output) = self.outputs.load(&options.deploy_name).await? else {
            return Err(CloudError::StateError(format!(
                "Deploy '{}' has no outputs, nothing to clean",
                options.deploy_name
            )));
        };

        let time_start = Utc::now();
        store.acquire_lock(MODIFICATION_LOCK).await?;
        let result = self
            .dispatcher
            .run_jobs(
                Direction::Remove,
                options.filter.apply_jobs(output.jobs()),
                RunOptions {
                    halt_on_failure: false,
                },
            )
            .await;
        let result = match result {
            Ok(report) => {
                for job in report.succeeded() {
                    output.remove(&job.key());
                }
                let persisted = if output.is_empty() && !options.preserve_output {
                    self.outputs.delete(&options.deploy_name).await.map(|_| ())
                } else {
                    self.outputs.save(&output).await
                };
                let event = Event::new(operation::CLEAN, time_start)
                    .with_field("bundle_name", output.bundle_name.as_str())
                    .with_field("deploy_name", options.deploy_name.as_str())
                    .with_field("time_end", Utc::now().to_rfc3339())
                    .with_field("operation_status", report.is_success());
                match persisted {
                    Ok(()) => store.log_event(event).await.map(|_| report),
                    Err(err) => Err(err),
                }
            }
            Err(err) => Err(err),
        };
        store.release_lock(MODIFICATION_LOCK).await?;

        Ok(RunSummary {
            operation: operation::CLEAN,
            deploy_name: options.deploy_name.clone(),
            bundle_name: output.bundle_name.clone(),
            report: result?,
        })
    }
}
