use crate::project::Project;
use colored::Colorize;
use stackwright_cloud::{
    CleanOptions, DeployOptions, ProjectStateStore, ResourceFilter, RunSummary,
};

/// Switches of the deploy command
#[derive(Debug, Default, Clone, Copy)]
pub struct DeployFlags {
    pub continue_deploy: bool,
    pub replace_output: bool,
    pub keep_going: bool,
}

/// Widen the filter with the configured name prefix/suffix.
fn resolved_filter(project: &Project, filter: ResourceFilter) -> ResourceFilter {
    filter.with_name_affixes(
        project.config.resources_prefix.as_deref(),
        project.config.resources_suffix.as_deref(),
    )
}

fn deploy_name_or_default(store: &ProjectStateStore, deploy_name: Option<String>) -> String {
    deploy_name
        .or_else(|| store.state().latest_deployed_deploy_name().map(str::to_string))
        .unwrap_or_else(|| store.state().default_deploy_name())
}

/// Print the outcome of a run; a run with failures is an error.
fn report(summary: &RunSummary) -> anyhow::Result<()> {
    let report = &summary.report;
    for batch in &report.batches {
        for job in batch.succeeded() {
            println!(
                "  {} {} {} ({})",
                "✓".green(),
                batch.kind.to_string().cyan(),
                job.name,
                job.region
            );
        }
        for (job, err) in batch.failures() {
            println!(
                "  {} {} {} ({}): {}",
                "✗".red(),
                batch.kind.to_string().cyan(),
                job.name,
                job.region,
                err
            );
        }
    }
    if let Some(kind) = report.halted_at {
        println!("{}", format!("Halted after {} failures", kind).yellow());
    }

    println!();
    if summary.is_success() {
        println!(
            "{}",
            format!(
                "{} '{}' succeeded: {} resources",
                summary.operation,
                summary.deploy_name,
                report.succeeded_count()
            )
            .green()
            .bold()
        );
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{} '{}' finished with {} failed resources",
            summary.operation,
            summary.deploy_name,
            report.failed_count()
        ))
    }
}

pub async fn handle_deploy(
    project: &Project,
    bundle: Option<String>,
    deploy_name: Option<String>,
    flags: DeployFlags,
    filter: ResourceFilter,
) -> anyhow::Result<()> {
    println!("{}", "Starting deploy...".blue().bold());
    let mut store = project.open_state().await?;

    let bundle = project.resolve_bundle(&store, bundle)?;
    let deploy_name = deploy_name.unwrap_or_else(|| store.state().default_deploy_name());
    println!("Bundle: {}", bundle.cyan());
    println!("Deploy name: {}", deploy_name.cyan());

    let descriptors = project.load_bundle(&bundle).await?;
    let mut options = DeployOptions::new(deploy_name, bundle);
    options.continue_deploy = flags.continue_deploy;
    options.replace_output = flags.replace_output;
    options.halt_on_failure = !flags.keep_going;
    options.filter = resolved_filter(project, filter);

    let summary = project
        .deployment()
        .deploy(&mut store, &descriptors, &options)
        .await?;
    report(&summary)
}

pub async fn handle_update(
    project: &Project,
    bundle: Option<String>,
    deploy_name: Option<String>,
    filter: ResourceFilter,
) -> anyhow::Result<()> {
    println!("{}", "Starting update...".blue().bold());
    let mut store = project.open_state().await?;

    let bundle = match bundle {
        Some(bundle) => bundle,
        None => match store.state().latest_deployed_bundle_name() {
            Some(bundle) => bundle.to_string(),
            None => project.resolve_bundle(&store, None)?,
        },
    };
    let deploy_name = deploy_name_or_default(&store, deploy_name);
    println!("Bundle: {}", bundle.cyan());
    println!("Deploy name: {}", deploy_name.cyan());

    let descriptors = project.load_bundle(&bundle).await?;
    let mut options = DeployOptions::new(deploy_name, bundle);
    options.filter = resolved_filter(project, filter);
    let summary = project
        .deployment()
        .update(&mut store, &descriptors, &options)
        .await?;
    report(&summary)
}

pub async fn handle_clean(
    project: &Project,
    deploy_name: Option<String>,
    preserve_output: bool,
    filter: ResourceFilter,
) -> anyhow::Result<()> {
    println!("{}", "Starting clean...".blue().bold());
    let mut store = project.open_state().await?;

    let deploy_name = deploy_name_or_default(&store, deploy_name);
    println!("Deploy name: {}", deploy_name.cyan());

    let mut options = CleanOptions::new(deploy_name);
    options.preserve_output = preserve_output;
    options.filter = resolved_filter(project, filter);
    let summary = project.deployment().clean(&mut store, &options).await?;
    report(&summary)
}
