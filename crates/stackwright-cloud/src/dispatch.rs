//! Dispatch orchestration
//!
//! The [`Dispatcher`] turns descriptors into jobs, looks up the adapter
//! registered for each kind and runs the jobs of one kind through a bounded
//! worker pool. [`Dispatcher::run`] walks all kinds in the direction's
//! priority order, one batch at a time.

use crate::adapter::{ProviderResult, ResourceAdapter};
use crate::error::{CloudError, Result};
use crate::region::{default_available_regions, resolve};
use crate::resource::{
    Description, Direction, ResourceDescriptor, ResourceJob, ResourceKind, substitute_alias,
};
use crate::retry::RetryPolicy;
use crate::trigger::{TriggerJob, TriggerKind, TriggerWiring, plan_triggers};
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_CONCURRENCY: usize = 5;

/// Handlers keyed by resource kind (and trigger kind)
#[derive(Default, Clone)]
pub struct DispatchTable {
    adapters: HashMap<ResourceKind, Arc<dyn ResourceAdapter>>,
    triggers: HashMap<TriggerKind, Arc<dyn TriggerWiring>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ResourceKind, adapter: Arc<dyn ResourceAdapter>) {
        self.adapters.insert(kind, adapter);
    }

    pub fn with(mut self, kind: ResourceKind, adapter: Arc<dyn ResourceAdapter>) -> Self {
        self.register(kind, adapter);
        self
    }

    pub fn register_trigger(&mut self, kind: TriggerKind, wiring: Arc<dyn TriggerWiring>) {
        self.triggers.insert(kind, wiring);
    }

    pub fn with_trigger(mut self, kind: TriggerKind, wiring: Arc<dyn TriggerWiring>) -> Self {
        self.register_trigger(kind, wiring);
        self
    }

    /// Adapter handling `kind` in `direction`
    pub fn adapter(&self, kind: ResourceKind, direction: Direction) -> Result<&Arc<dyn ResourceAdapter>> {
        self.adapters
            .get(&kind)
            .ok_or(CloudError::HandlerNotFound { kind, direction })
    }

    pub fn trigger(&self, kind: TriggerKind) -> Result<&Arc<dyn TriggerWiring>> {
        self.triggers.get(&kind).ok_or_else(|| {
            CloudError::InvalidConfig(format!("No wiring registered for trigger type '{}'", kind))
        })
    }

    /// Kinds with a registered adapter
    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<ResourceKind> = self.adapters.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

/// Result of one job
#[derive(Debug)]
pub struct JobOutcome {
    pub job: ResourceJob,
    /// `Some` for create/update, `None` for remove
    pub result: std::result::Result<Option<Description>, CloudError>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcomes of every job of one kind
#[derive(Debug)]
pub struct BatchResult {
    pub kind: ResourceKind,
    pub direction: Direction,
    pub outcomes: Vec<JobOutcome>,
}

impl BatchResult {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(JobOutcome::is_success)
    }

    pub fn descriptions(&self) -> impl Iterator<Item = &Description> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().and_then(Option::as_ref))
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ResourceJob> {
        self.outcomes.iter().filter(|o| o.is_success()).map(|o| &o.job)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ResourceJob, &CloudError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.job, e)))
    }
}

/// Options for [`Dispatcher::run`]
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Stop after the first batch with a failed job
    pub halt_on_failure: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            halt_on_failure: true,
        }
    }
}

/// Aggregate of a full run
#[derive(Debug)]
pub struct DeploymentReport {
    pub direction: Direction,
    pub batches: Vec<BatchResult>,
    /// Kind of the batch that stopped the run, if any
    pub halted_at: Option<ResourceKind>,
}

impl DeploymentReport {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            batches: Vec::new(),
            halted_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.halted_at.is_none() && self.batches.iter().all(BatchResult::is_success)
    }

    pub fn descriptions(&self) -> impl Iterator<Item = &Description> {
        self.batches.iter().flat_map(BatchResult::descriptions)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ResourceJob> {
        self.batches.iter().flat_map(BatchResult::succeeded)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&ResourceJob, &CloudError)> {
        self.batches.iter().flat_map(BatchResult::failures)
    }

    pub fn succeeded_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }
}

/// Resolves, fans out and collects provider calls
#[derive(Clone)]
pub struct Dispatcher {
    table: Arc<DispatchTable>,
    available_regions: Vec<String>,
    default_region: String,
    concurrency: usize,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(table: Arc<DispatchTable>, default_region: impl Into<String>) -> Self {
        Self {
            table,
            available_regions: default_available_regions(),
            default_region: default_region.into(),
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_available_regions(mut self, regions: Vec<String>) -> Self {
        self.available_regions = regions;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    pub fn default_region(&self) -> &str {
        &self.default_region
    }

    /// Resolve descriptors into jobs against this dispatcher's regions.
    pub fn resolve(&self, descriptors: &[ResourceDescriptor]) -> Result<Vec<ResourceJob>> {
        resolve(descriptors, &self.available_regions, &self.default_region)
    }

    pub async fn dispatch_create(
        &self,
        kind: ResourceKind,
        descriptors: &[ResourceDescriptor],
    ) -> Result<BatchResult> {
        self.dispatch(Direction::Create, kind, descriptors).await
    }

    pub async fn dispatch_remove(
        &self,
        kind: ResourceKind,
        descriptors: &[ResourceDescriptor],
    ) -> Result<BatchResult> {
        self.dispatch(Direction::Remove, kind, descriptors).await
    }

    pub async fn dispatch_update(
        &self,
        kind: ResourceKind,
        descriptors: &[ResourceDescriptor],
    ) -> Result<BatchResult> {
        self.dispatch(Direction::Update, kind, descriptors).await
    }

    async fn dispatch(
        &self,
        direction: Direction,
        kind: ResourceKind,
        descriptors: &[ResourceDescriptor],
    ) -> Result<BatchResult> {
        self.table.adapter(kind, direction)?;
        let jobs = self.resolve(descriptors)?;
        self.dispatch_jobs(direction, kind, jobs).await
    }

    /// Run already resolved jobs of one kind through the worker pool.
    ///
    /// Individual job failures are collected, never raised.
    pub async fn dispatch_jobs(
        &self,
        direction: Direction,
        kind: ResourceKind,
        jobs: Vec<ResourceJob>,
    ) -> Result<BatchResult> {
        let adapter = self.table.adapter(kind, direction)?;
        tracing::info!("{} {} {} resource(s)", direction, jobs.len(), kind);

        let mut indexed: Vec<(usize, JobOutcome)> = stream::iter(jobs.into_iter().enumerate())
            .map(|(index, job)| async move {
                let result = self.execute(direction, adapter.as_ref(), &job).await;
                if let Err(err) = &result {
                    tracing::error!("Failed to {} {} {}: {}", direction, kind, job.name, err);
                }
                (index, JobOutcome { job, result })
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        indexed.sort_by_key(|(index, _)| *index);

        Ok(BatchResult {
            kind,
            direction,
            outcomes: indexed.into_iter().map(|(_, outcome)| outcome).collect(),
        })
    }

    async fn execute(
        &self,
        direction: Direction,
        adapter: &dyn ResourceAdapter,
        job: &ResourceJob,
    ) -> std::result::Result<Option<Description>, CloudError> {
        let triggers = plan_triggers(job, &self.available_regions, &self.default_region)?;
        let wirings = triggers
            .iter()
            .map(|t| self.table.trigger(t.kind).map(Arc::clone))
            .collect::<Result<Vec<_>>>()?;

        match direction {
            Direction::Create => {
                let op = format!("create {}", job.key());
                let description = self.retry.run(&op, || adapter.create(job)).await?;
                let description = self.with_identifier(adapter, job, description).await?;
                for (trigger, wiring) in triggers.iter().zip(&wirings) {
                    self.attach(wiring.as_ref(), &description, trigger).await?;
                }
                Ok(Some(description))
            }
            Direction::Update => {
                let op = format!("update {}", job.key());
                let description = self.retry.run(&op, || adapter.update(job)).await?;
                Ok(Some(self.with_identifier(adapter, job, description).await?))
            }
            Direction::Remove => {
                for (trigger, wiring) in triggers.iter().zip(&wirings) {
                    let op = format!("detach {} from {}", trigger.kind, job.key());
                    self.retry
                        .run(&op, || wiring.detach(job, trigger))
                        .await?;
                }
                let op = format!("remove {}", job.key());
                self.retry.run(&op, || adapter.remove(job)).await?;
                Ok(None)
            }
        }
    }

    async fn with_identifier(
        &self,
        adapter: &dyn ResourceAdapter,
        job: &ResourceJob,
        description: Description,
    ) -> ProviderResult<Description> {
        if description.identifier.is_some() {
            return Ok(description);
        }
        let op = format!("identify {}", job.key());
        match self.retry.run(&op, || adapter.identify(job)).await? {
            Some(identifier) => Ok(description.with_identifier(identifier)),
            None => Ok(description),
        }
    }

    async fn attach(
        &self,
        wiring: &dyn TriggerWiring,
        function: &Description,
        trigger: &TriggerJob,
    ) -> ProviderResult<()> {
        let op = format!("attach {} to {}", trigger.kind, function.key());
        self.retry.run(&op, || wiring.attach(function, trigger)).await?;
        tracing::info!(
            "Attached {} {} to {}",
            trigger.kind,
            trigger.target().unwrap_or_default(),
            function.resource_name
        );
        Ok(())
    }

    /// Resolve every descriptor and run the whole set in priority order.
    ///
    /// Regions and handlers are validated for all descriptors before the
    /// first provider call.
    pub async fn run(
        &self,
        direction: Direction,
        descriptors: &[ResourceDescriptor],
        options: RunOptions,
    ) -> Result<DeploymentReport> {
        let jobs = self.resolve(descriptors)?;
        self.run_jobs(direction, jobs, options).await
    }

    /// Run resolved jobs batch by batch in the direction's priority order.
    ///
    /// After each batch, `#{name}` aliases in the remaining jobs are replaced
    /// with the identifiers the batch produced.
    pub async fn run_jobs(
        &self,
        direction: Direction,
        mut jobs: Vec<ResourceJob>,
        options: RunOptions,
    ) -> Result<DeploymentReport> {
        let order = direction.order();
        let mut batches: Vec<ResourceKind> = Vec::new();
        for kind in &order {
            if !jobs.iter().any(|job| job.kind == *kind) {
                continue;
            }
            let adapter = self.table.adapter(*kind, direction)?;
            if direction == Direction::Update && !adapter.supports_update() {
                tracing::info!("{} doesn't support update, skipping", kind);
                continue;
            }
            batches.push(*kind);
        }
        let skipped = jobs.iter().filter(|job| !batches.contains(&job.kind)).count();
        if skipped > 0 {
            tracing::info!("{} resource(s) have no {} step", skipped, direction);
        }

        let mut report = DeploymentReport::new(direction);
        for kind in batches {
            let (batch, rest): (Vec<ResourceJob>, Vec<ResourceJob>) =
                jobs.into_iter().partition(|job| job.kind == kind);
            jobs = rest;

            let result = self.dispatch_jobs(direction, kind, batch).await?;
            for description in result.descriptions() {
                if let Some(identifier) = &description.identifier {
                    for job in jobs.iter_mut() {
                        substitute_alias(&mut job.meta, &description.resource_name, identifier);
                    }
                }
            }

            let failed = !result.is_success();
            report.batches.push(result);
            if failed && options.halt_on_failure {
                tracing::warn!("Stopping {} after failures in {} batch", direction, kind);
                report.halted_at = Some(kind);
                break;
            }
        }
        Ok(report)
    }
}
