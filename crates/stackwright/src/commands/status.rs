use crate::project::Project;
use colored::Colorize;
use stackwright_cloud::{StateManager, SyncOutcome};

pub async fn handle(project: &Project, events: usize) -> anyhow::Result<()> {
    let store = project.open_state().await?;
    let state = store.state();

    println!("{}", format!("Project: {}", state.name).bold());
    println!("Region: {}", project.config.region.cyan());
    println!("Default deploy name: {}", state.default_deploy_name().cyan());

    println!();
    println!("{}", "Locks:".bold());
    if state.locks.is_empty() {
        println!("  (none)");
    }
    for (name, lock) in &state.locks {
        let status = if lock.locked {
            "locked".red()
        } else {
            "free".green()
        };
        println!(
            "  • {} {} (by {} at {})",
            name.cyan(),
            status,
            lock.initiator,
            lock.last_modification_date.to_rfc3339()
        );
    }

    println!();
    println!("{}", "Latest deploy:".bold());
    match (
        state.latest_deployed_deploy_name(),
        state.latest_deployed_bundle_name(),
    ) {
        (Some(deploy_name), Some(bundle)) => {
            let status = if state.latest_deploy_failed() {
                "failed".red()
            } else {
                "ok".green()
            };
            println!("  {} from bundle {} [{}]", deploy_name.cyan(), bundle, status);
        }
        _ => println!("  (none)"),
    }
    if let Some(bundle) = state.latest_bundle_name() {
        println!("Latest bundle: {}", bundle.cyan());
    }

    println!();
    println!("{}", "Events:".bold());
    if state.events.is_empty() {
        println!("  (none)");
    }
    for event in state.events.iter().take(events) {
        let mut line = format!(
            "  {} {}",
            event.time_start.format("%Y-%m-%d %H:%M:%S"),
            event.operation.cyan()
        );
        for key in ["deploy_name", "bundle_name"] {
            if let Some(value) = event.field_str(key) {
                line.push_str(&format!(" {}={}", key, value));
            }
        }
        if let Some(ok) = event.fields.get("operation_status").and_then(|v| v.as_bool()) {
            line.push_str(&format!(" {}", if ok { "ok".green() } else { "failed".red() }));
        }
        println!("{}", line);
    }
    Ok(())
}

pub async fn handle_sync(project: &Project) -> anyhow::Result<()> {
    let Some(remote_path) = &project.config.remote_state_path else {
        anyhow::bail!("remote_state_path is not configured");
    };
    println!("{}", "Syncing project state...".blue().bold());
    println!("Remote: {}", remote_path.display().to_string().cyan());

    let mut store = project.open_state().await?;
    let outcome = store.sync(&StateManager::new(remote_path)).await?;
    match outcome {
        SyncOutcome::Pushed => println!("{} Remote state created", "✓".green()),
        SyncOutcome::Reconciled => println!("{} Local and remote state reconciled", "✓".green()),
    }
    Ok(())
}

pub async fn handle_unlock(project: &Project, lock: &str) -> anyhow::Result<()> {
    let mut store = project.open_state().await?;
    if store.state().is_lock_free(lock) {
        println!("Lock {} is already free", lock.cyan());
        return Ok(());
    }
    tracing::warn!("Force releasing lock {}", lock);
    store.release_lock(lock).await?;
    println!("{} Released {}", "✓".green(), lock.cyan());
    Ok(())
}
