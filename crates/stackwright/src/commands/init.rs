use anyhow::Context;
use colored::Colorize;
use stackwright_cloud::ProjectStateStore;
use std::path::Path;

const CONFIG_FILE: &str = "stackwright.yaml";

pub async fn handle(path: &Path, name: Option<String>, region: &str) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let root = path.canonicalize()?;

    let name = match name {
        Some(name) => name,
        None => root
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("Cannot derive a project name, pass --name"))?,
    };

    println!("{}", "Initializing project...".blue().bold());

    let config_path = root.join(CONFIG_FILE);
    if config_path.exists() {
        println!("Keeping existing {}", CONFIG_FILE.cyan());
    } else {
        tokio::fs::write(&config_path, format!("region: {}\n", region)).await?;
        println!("Created {}", CONFIG_FILE.cyan());
    }

    let store = ProjectStateStore::init(&root, &name).await?;
    println!(
        "{} Project '{}' (deploy name {})",
        "✓".green(),
        name.cyan(),
        store.state().default_deploy_name().cyan()
    );
    Ok(())
}
