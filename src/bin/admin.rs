//! MADSci Workcell Admin CLI
//!
//! Administrative CLI for inspecting and maintaining a workcell engine's
//! NATS JetStream-backed state: nodes, locations, active/archived
//! workflows, and the underlying KV bucket itself.

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use madsci_workcell_engine::engine::{
    DistributedStateStore, DistributedStateStoreConfig, WorkcellStateStore, BUCKET_NAME,
};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "madsci-workcell-admin")]
#[command(about = "MADSci Workcell Admin CLI - inspect and maintain workcell state")]
#[command(version = "1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://localhost:4222")]
    nats_url: String,

    /// Workcell id whose namespace to operate on
    #[arg(long, env = "WORKCELL_ID", default_value = "default")]
    workcell_id: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Summary counts: nodes, locations, active and archived workflows
    Stats,

    /// List all registered nodes and their last-known status
    ListNodes,

    /// List all locations
    ListLocations,

    /// List active workflows (queued, running, or paused)
    ListWorkflows,

    /// List archived (terminal) workflows
    ListArchived {
        /// Only show the most recent N
        #[arg(long)]
        number: Option<usize>,
    },

    /// Show one workflow's full record, active or archived
    ShowWorkflow { workflow_id: String },

    /// Show the workcell's topology definition and current status
    ShowWorkcell,

    /// Reset a location to empty (no resource, no reservation)
    ResetLocation {
        location_id: String,

        /// Confirm the reset
        #[arg(long)]
        confirm: bool,
    },

    /// NATS KV bucket management
    Bucket {
        #[command(subcommand)]
        action: BucketCommands,
    },
}

#[derive(Subcommand)]
enum BucketCommands {
    /// Show the bucket name and whether it exists
    Info,

    /// Delete the entire state bucket - wipes every workcell's state
    Purge {
        /// Confirm the purge
        #[arg(long)]
        confirm: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    match cli.command {
        Commands::Bucket { action } => handle_bucket_command(&cli.nats_url, action).await?,
        other => {
            let store = connect(&cli).await?;
            match other {
                Commands::Stats => show_stats(&store).await?,
                Commands::ListNodes => list_nodes(&store).await?,
                Commands::ListLocations => list_locations(&store).await?,
                Commands::ListWorkflows => list_workflows(&store).await?,
                Commands::ListArchived { number } => list_archived(&store, number).await?,
                Commands::ShowWorkflow { workflow_id } => show_workflow(&store, &workflow_id).await?,
                Commands::ShowWorkcell => show_workcell(&store).await?,
                Commands::ResetLocation { location_id, confirm } => {
                    if !confirm {
                        error!("reset requires --confirm");
                        return Ok(());
                    }
                    reset_location(&store, &location_id).await?;
                }
                Commands::Bucket { .. } => unreachable!("handled above"),
            }
        }
    }

    Ok(())
}

async fn connect(cli: &Cli) -> Result<DistributedStateStore> {
    let config = DistributedStateStoreConfig {
        nats_urls: vec![cli.nats_url.clone()],
        workcell_id: cli.workcell_id.clone(),
        connection_timeout: Duration::from_secs(10),
    };
    Ok(DistributedStateStore::connect(config).await?)
}

async fn show_stats(store: &DistributedStateStore) -> Result<()> {
    let nodes = store.list_nodes().await?;
    let locations = store.list_locations().await?;
    let active = store.list_active_workflows().await?;
    let archived = store.list_archived_workflows().await?;

    println!("\nWorkcell statistics");
    println!("===================");
    println!("Nodes:              {}", nodes.len());
    println!("Locations:          {}", locations.len());
    println!("Active workflows:   {}", active.len());
    println!("Archived workflows: {}", archived.len());
    Ok(())
}

async fn list_nodes(store: &DistributedStateStore) -> Result<()> {
    let nodes = store.list_nodes().await?;
    println!("\nNodes ({})", nodes.len());
    println!("=========");
    if nodes.is_empty() {
        println!("No nodes registered.");
        return Ok(());
    }
    for (name, node) in nodes {
        let status = node.status.as_ref().map(|s| s.description()).unwrap_or_else(|| "never polled".to_string());
        println!("{name}: {} - {status}", node.node_url);
    }
    Ok(())
}

async fn list_locations(store: &DistributedStateStore) -> Result<()> {
    let locations = store.list_locations().await?;
    println!("\nLocations ({})", locations.len());
    println!("=============");
    if locations.is_empty() {
        println!("No locations registered.");
        return Ok(());
    }
    for (id, location) in locations {
        println!(
            "{id}: {} (resource: {})",
            location.location_name,
            location.resource_id.as_deref().unwrap_or("none")
        );
    }
    Ok(())
}

async fn list_workflows(store: &DistributedStateStore) -> Result<()> {
    let workflows = store.list_active_workflows().await?;
    println!("\nActive workflows ({})", workflows.len());
    println!("=====================");
    if workflows.is_empty() {
        println!("No active workflows.");
        return Ok(());
    }
    for wf in workflows {
        println!("{}: {} - {}", wf.workflow_id, wf.name, wf.status.description());
    }
    Ok(())
}

async fn list_archived(store: &DistributedStateStore, number: Option<usize>) -> Result<()> {
    let mut workflows = store.list_archived_workflows().await?;
    workflows.sort_by_key(|wf| std::cmp::Reverse(wf.end_time));
    if let Some(n) = number {
        workflows.truncate(n);
    }
    println!("\nArchived workflows ({})", workflows.len());
    println!("=======================");
    if workflows.is_empty() {
        println!("No archived workflows.");
        return Ok(());
    }
    for wf in workflows {
        println!("{}: {} - {}", wf.workflow_id, wf.name, wf.status.description());
    }
    Ok(())
}

async fn show_workflow(store: &DistributedStateStore, workflow_id: &str) -> Result<()> {
    let workflow = match store.get_workflow(workflow_id).await? {
        Some(wf) => wf,
        None => match store.get_archived_workflow(workflow_id).await? {
            Some(wf) => wf,
            None => {
                warn!(workflow_id, "no such active or archived workflow");
                return Ok(());
            }
        },
    };
    println!("{}", serde_json::to_string_pretty(&workflow)?);
    Ok(())
}

async fn show_workcell(store: &DistributedStateStore) -> Result<()> {
    let status = store.get_workcell_status().await?;
    println!("Status: {status:?}");
    match store.get_workcell_definition().await? {
        Some(definition) => println!("{}", serde_json::to_string_pretty(&definition)?),
        None => println!("No workcell definition has been set."),
    }
    Ok(())
}

async fn reset_location(store: &DistributedStateStore, location_id: &str) -> Result<()> {
    let Some(mut location) = store.get_location(location_id).await? else {
        warn!(location_id, "no such location");
        return Ok(());
    };
    location.resource_id = None;
    location.reserved_by = None;
    store.set_location(location_id, location).await?;
    info!(location_id, "location reset");
    Ok(())
}

async fn handle_bucket_command(nats_url: &str, action: BucketCommands) -> Result<()> {
    let client = async_nats::connect(nats_url).await?;
    let jetstream = async_nats::jetstream::new(client);

    match action {
        BucketCommands::Info => match jetstream.get_key_value(BUCKET_NAME).await {
            Ok(_) => println!("bucket '{BUCKET_NAME}' exists"),
            Err(_) => println!("bucket '{BUCKET_NAME}' does not exist"),
        },
        BucketCommands::Purge { confirm } => {
            if !confirm {
                error!("purge requires --confirm - this wipes every workcell's state");
                return Ok(());
            }
            jetstream.delete_key_value(BUCKET_NAME).await?;
            info!(bucket = BUCKET_NAME, "state bucket deleted");
        }
    }
    Ok(())
}
