use crate::project::Project;
use colored::Colorize;
use stackwright_local::dispatch_table;
use stackwright_transform::{OutputFormat, TransformSettings, Transformer};
use std::path::PathBuf;
use std::sync::Arc;

pub async fn handle(
    project: &Project,
    bundle: Option<String>,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("{}", "Transforming bundle...".blue().bold());
    let store = project.open_state().await?;
    let bundle = project.resolve_bundle(&store, bundle)?;
    println!("Bundle: {}", bundle.cyan());

    let descriptors = project.load_bundle(&bundle).await?;

    let cloud = project.cloud();
    let mut settings = TransformSettings::new(&project.config.region, cloud.account_id());
    if let Some(bucket) = &project.config.deploy_target_bucket {
        settings = settings.with_bucket(bucket);
    }

    // Resources outside the bundle resolve against what the provider holds
    let transformer = Transformer::new(settings)
        .with_lookup(Arc::new(dispatch_table(cloud)))
        .with_description(format!("{} ({})", store.state().name, bundle));
    let template = transformer.transform(&descriptors).await?;

    let dir = output.unwrap_or_else(|| project.bundle_dir(&bundle));
    let path = transformer.write(&template, &dir, format).await?;
    println!(
        "{} {} resources written to {}",
        "✓".green(),
        template.len(),
        path.display()
    );
    Ok(())
}
