mod commands;
mod project;

use clap::{Args, Parser, Subcommand};
use stackwright_cloud::{MODIFICATION_LOCK, ResourceFilter, ResourceKind};
use stackwright_transform::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackwright")]
#[command(about = "Declarative cloud resources, deployed and tracked", long_about = None)]
struct Cli {
    /// Config file (defaults to stackwright.yaml discovery)
    #[arg(short, long, global = true, env = "STACKWRIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Resource selection shared by deploy, update and clean
#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Only these resources (repeatable)
    #[arg(long = "only-resource", value_name = "NAME")]
    only_resources: Vec<String>,
    /// Only resources of these types (repeatable)
    #[arg(long = "only-type", value_name = "TYPE")]
    only_types: Vec<ResourceKind>,
    /// Skip these resources (repeatable)
    #[arg(long = "exclude-resource", value_name = "NAME")]
    excluded_resources: Vec<String>,
    /// Skip resources of these types (repeatable)
    #[arg(long = "exclude-type", value_name = "TYPE")]
    excluded_types: Vec<ResourceKind>,
}

impl From<FilterArgs> for ResourceFilter {
    fn from(args: FilterArgs) -> Self {
        ResourceFilter {
            only_names: args.only_resources.into_iter().collect(),
            only_types: args.only_types.into_iter().collect(),
            excluded_names: args.excluded_resources.into_iter().collect(),
            excluded_types: args.excluded_types.into_iter().collect(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the project state and a starter config
    Init {
        /// Project name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,
        /// Default region written to a new config
        #[arg(short, long, default_value = "eu-west-1")]
        region: String,
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Collect deployment_resources.json files into a bundle
    Build {
        /// Bundle name (defaults to <project>_<timestamp>)
        #[arg(short, long)]
        bundle: Option<String>,
    },
    /// Create the resources of a bundle
    Deploy {
        /// Bundle to deploy (defaults to the latest build)
        #[arg(short, long)]
        bundle: Option<String>,
        /// Deploy name (defaults to one derived from the project name)
        #[arg(short, long)]
        deploy_name: Option<String>,
        /// Deploy on top of a failed deploy with the same name
        #[arg(long)]
        continue_deploy: bool,
        /// Replace the outputs of an existing deploy with the same name
        #[arg(long)]
        replace_output: bool,
        /// Keep going when a resource type fails
        #[arg(long)]
        keep_going: bool,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Update the resources of a deployed bundle
    Update {
        #[arg(short, long)]
        bundle: Option<String>,
        #[arg(short, long)]
        deploy_name: Option<String>,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Remove the resources of a deploy
    Clean {
        #[arg(short, long)]
        deploy_name: Option<String>,
        /// Keep the deploy output file
        #[arg(long)]
        preserve_output: bool,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Write a CloudFormation template for a bundle
    Transform {
        #[arg(short, long)]
        bundle: Option<String>,
        /// json or yaml
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,
        /// Output directory (defaults to the bundle directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show locks, the latest deploy and recent events
    Status {
        /// Number of events to show
        #[arg(short, long, default_value = "10")]
        events: usize,
    },
    /// Reconcile the project state with the remote copy
    Sync,
    /// Release a lock left behind by an interrupted run
    Unlock {
        #[arg(default_value = MODIFICATION_LOCK)]
        lock: String,
    },
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = cli.config;
    let load = || project::Project::load(config.as_deref());

    match cli.command {
        Commands::Init { name, region, path } => {
            commands::init::handle(&path, name, &region).await?
        }
        Commands::Build { bundle } => commands::build::handle(&load()?, bundle).await?,
        Commands::Deploy {
            bundle,
            deploy_name,
            continue_deploy,
            replace_output,
            keep_going,
            filter,
        } => {
            let flags = commands::deploy::DeployFlags {
                continue_deploy,
                replace_output,
                keep_going,
            };
            commands::deploy::handle_deploy(&load()?, bundle, deploy_name, flags, filter.into())
                .await?
        }
        Commands::Update {
            bundle,
            deploy_name,
            filter,
        } => commands::deploy::handle_update(&load()?, bundle, deploy_name, filter.into()).await?,
        Commands::Clean {
            deploy_name,
            preserve_output,
            filter,
        } => {
            commands::deploy::handle_clean(&load()?, deploy_name, preserve_output, filter.into())
                .await?
        }
        Commands::Transform {
            bundle,
            format,
            output,
        } => commands::transform::handle(&load()?, bundle, format, output).await?,
        Commands::Status { events } => commands::status::handle(&load()?, events).await?,
        Commands::Sync => commands::status::handle_sync(&load()?).await?,
        Commands::Unlock { lock } => commands::status::handle_unlock(&load()?, &lock).await?,
        Commands::Version => {
            println!("stackwright {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
