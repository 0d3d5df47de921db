use crate::project::{BUILD_META_FILE, Project};
use anyhow::Context;
use chrono::Utc;
use colored::Colorize;
use indexmap::IndexMap;
use serde_json::Value;
use stackwright_cloud::resource::resolve_names;
use stackwright_cloud::state::default_build_path;
use stackwright_cloud::{Event, ResourceDescriptor, ResourceKind, state::operation};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const RESOURCES_FILE: &str = "deployment_resources.json";
const SKIPPED_DIR: &str = ".stackwright";

/// Every deployment resources file under `root`, build output excluded.
fn find_resource_files(root: &Path, output_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let pattern = format!("{}/**/{}", root.display(), RESOURCES_FILE);
    let mut files = Vec::new();
    for entry in glob::glob(&pattern)? {
        let path = entry?;
        let skipped = path.starts_with(output_dir)
            || path
                .strip_prefix(root)
                .map(|rel| rel.components().any(|c| c.as_os_str() == SKIPPED_DIR))
                .unwrap_or(false);
        if !skipped {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Merge resource files into one document, in declaration order; a name
/// may be declared once.
async fn merge_resources(files: &[PathBuf]) -> anyhow::Result<IndexMap<String, Value>> {
    let mut merged = IndexMap::new();
    let mut origins: HashMap<String, PathBuf> = HashMap::new();
    for file in files {
        let content = tokio::fs::read_to_string(file).await?;
        let resources: IndexMap<String, Value> = serde_json::from_str(&content)
            .with_context(|| format!("{} must contain a JSON object", file.display()))?;
        for (name, meta) in resources {
            if let Some(origin) = origins.get(&name) {
                anyhow::bail!(
                    "Resource '{}' is declared in both {} and {}",
                    name,
                    origin.display(),
                    file.display()
                );
            }
            origins.insert(name.clone(), file.clone());
            merged.insert(name, meta);
        }
    }
    Ok(merged)
}

/// Runtime family used by the build mapping (`python3.12` -> `python`)
fn runtime_family(runtime: &str) -> &str {
    let end = runtime
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(runtime.len());
    &runtime[..end]
}

pub async fn handle(project: &Project, bundle: Option<String>) -> anyhow::Result<()> {
    println!("{}", "Building bundle...".blue().bold());
    let mut store = project.open_state().await?;

    let bundle = bundle.unwrap_or_else(|| {
        format!("{}_{}", store.state().name, Utc::now().format("%y%m%d.%H%M%S"))
    });
    println!("Bundle: {}", bundle.cyan());

    let output_dir = project.config.output_dir();
    let files = find_resource_files(&project.root, &output_dir)?;
    if files.is_empty() {
        anyhow::bail!(
            "No {} found under {}",
            RESOURCES_FILE,
            project.root.display()
        );
    }
    for file in &files {
        println!("  • {}", file.display());
    }

    let merged = merge_resources(&files).await?;
    let mut descriptors = merged
        .into_iter()
        .map(|(name, meta)| ResourceDescriptor::from_meta(name, meta))
        .collect::<Result<Vec<_>, _>>()?;
    resolve_names(
        &mut descriptors,
        project.config.resources_prefix.as_deref(),
        project.config.resources_suffix.as_deref(),
    );

    let meta: IndexMap<&str, &serde_json::Map<String, Value>> = descriptors
        .iter()
        .map(|d| (d.name.as_str(), &d.meta))
        .collect();

    let bundle_dir = project.bundle_dir(&bundle);
    tokio::fs::create_dir_all(&bundle_dir).await?;
    let meta_path = bundle_dir.join(BUILD_META_FILE);
    tokio::fs::write(&meta_path, serde_json::to_string_pretty(&meta)?).await?;

    for descriptor in descriptors.iter().filter(|d| d.kind == ResourceKind::Lambda) {
        let Some(runtime) = descriptor.meta.get("runtime").and_then(Value::as_str) else {
            continue;
        };
        store.add_lambda(&descriptor.name, runtime).await?;
        let family = runtime_family(runtime);
        if !store.state().build_projects_mapping.contains_key(family) {
            if default_build_path(family).is_some() {
                store.add_build_mapping(family, None).await?;
            } else {
                tracing::warn!("No default build path for runtime {}", runtime);
            }
        }
    }

    let event = Event::new(operation::BUILD, Utc::now()).with_field("bundle_name", bundle.as_str());
    store.log_event(event).await?;

    println!(
        "{} {} resources written to {}",
        "✓".green(),
        descriptors.len(),
        meta_path.display()
    );
    Ok(())
}
