//! Mirror CLI - keeps a local picture of the projects linked in a set of folders and of
//! their deployments.
//!
//! # Usage
//!
//! ```bash
//! # One-shot snapshot of the current directory
//! mirror status
//!
//! # Snapshot of several folders, as JSON
//! mirror status ~/code/web ~/code/docs --format json
//!
//! # Keep mirroring and print every change until Ctrl-C
//! mirror watch ~/code
//! ```
//!
//! The access token comes from `api.token` in the configuration file or `MIRROR_TOKEN`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mirror_api::{ApiClientConfig, HttpApiClient};
use mirror_core::config::MirrorConfig;
use mirror_state::caches::{DeploymentsEvent, LinkedProjectsEvent};
use mirror_state::host::{Session, WorkspaceState};
use mirror_state::models::Deployment;
use mirror_state::projections::humanize_age;
use mirror_state::{MirrorApp, MirrorAppOptions};
use serde_json::json;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

#[derive(Parser)]
#[command(name = "mirror")]
#[command(about = "Mirror linked projects and their deployments", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: MIRROR_CONFIG_PATH or the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    format: OutputFormatArg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormatArg {
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Load everything once and print a snapshot
    Status {
        /// Workspace folders (default: current directory)
        folders: Vec<PathBuf>,
    },

    /// Keep mirroring and print changes until interrupted
    Watch {
        /// Workspace folders (default: current directory)
        folders: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MirrorConfig::load_from_path(path).await,
        None => MirrorConfig::load().await,
    }
    .context("Failed to load configuration")?;
    init_logging(cli.verbose, &config.general.log_level);

    match cli.command {
        Commands::Status { folders } => {
            let app = start(config, folders).await?;
            print_snapshot(&app, cli.format);
            app.shutdown();
        }
        Commands::Watch { folders } => {
            let app = start(config, folders).await?;
            print_snapshot(&app, cli.format);
            watch(&app).await?;
            app.shutdown();
        }
    }

    Ok(())
}

/// Wire the graph over `folders` and run the initial load.
async fn start(config: MirrorConfig, folders: Vec<PathBuf>) -> Result<MirrorApp> {
    let folders = if folders.is_empty() {
        vec![std::env::current_dir().context("Failed to read the current directory")?]
    } else {
        folders
    };

    let session = config.api.token.as_ref().map(|token| {
        let session = Session::new(token.clone());
        match &config.api.team_id {
            Some(team_id) => session.with_team(team_id.clone()),
            None => session,
        }
    });
    if session.is_none() {
        warn!("No access token configured, remote data will not be loaded");
    }

    let workspace_state = WorkspaceState::load(&config.state.workspace_state_path)
        .await
        .context("Failed to load workspace state")?;
    let api = HttpApiClient::new(ApiClientConfig::from_config(&config.api))
        .context("Failed to create API client")?;

    debug!("Mirroring {} folder(s)", folders.len());
    let options = MirrorAppOptions::new(config, Arc::new(api))
        .with_folders(folders)
        .with_session(session)
        .with_workspace_state(Arc::new(workspace_state));
    let app = MirrorApp::new(options).context("Failed to wire components")?;
    app.bootstrap().await.context("Bootstrap failed")?;
    Ok(app)
}

fn print_snapshot(app: &MirrorApp, format: OutputFormatArg) {
    let now = chrono::Utc::now().timestamp_millis();
    let local = app.local_projects().projects();
    let linked = app.linked_projects().projects();
    let deployments = app.deployments().deployments();

    if format == OutputFormatArg::Json {
        let snapshot = json!({
            "status": app.status_bar().view().text,
            "localProjects": local.iter().map(|project| json!({
                "root": project.root,
                "projectId": project.descriptor.project_id,
                "linked": linked.iter().any(|linked| linked.local.id == project.id),
            })).collect::<Vec<_>>(),
            "projects": app.projects().projects().iter().map(|project| json!({
                "id": project.id,
                "name": project.name,
                "teamId": project.team_id,
            })).collect::<Vec<_>>(),
            "deployments": deployments.iter().map(|deployment| json!({
                "id": deployment.id,
                "project": deployment.project.name,
                "state": deployment.state().map(|state| state.as_str()),
                "target": deployment.target().map(|target| target.as_str()),
                "url": deployment.url(),
                "createdAt": deployment.created_at(),
            })).collect::<Vec<_>>(),
        });
        println!("{snapshot:#}");
        return;
    }

    println!("Status: {}", app.status_bar().view().text);
    println!();
    println!("Local projects ({}):", local.len());
    for project in &local {
        let link = linked
            .iter()
            .find(|linked| linked.local.id == project.id)
            .map_or_else(|| "not linked".to_string(), |linked| linked.remote.name.clone());
        println!("  {}  ->  {}", project.root.display(), link);
    }
    println!();
    println!("Deployments ({}):", deployments.len());
    for deployment in &deployments {
        println!("  {}", deployment_line(deployment, now));
    }
}

fn deployment_line(deployment: &Deployment, now: i64) -> String {
    let state = deployment.state().map_or("Unknown", |state| state.label());
    let target = deployment.target().map_or("", |target| target.label());
    format!(
        "{:<24} {:<12} {:<10} {:<11} {}",
        deployment.project.name,
        state,
        target,
        humanize_age(deployment.created_at(), now),
        deployment.url().unwrap_or("-")
    )
}

/// Print linked project, deployment and status bar changes until Ctrl-C.
async fn watch(app: &MirrorApp) -> Result<()> {
    let mut linked = app.linked_projects().subscribe();
    let mut deployments = app.deployments().subscribe();
    let mut status = app.status_bar().subscribe();
    println!();
    println!("Watching for changes, press Ctrl-C to stop");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                return Ok(());
            }
            event = linked.recv() => match event {
                Ok(LinkedProjectsEvent::DidChange) => {
                    println!("Linked projects: {}", app.linked_projects().projects().len());
                }
                Ok(LinkedProjectsEvent::WillChange) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(()),
            },
            event = deployments.recv() => match event {
                Ok(DeploymentsEvent::DidChange) => {
                    let now = chrono::Utc::now().timestamp_millis();
                    for deployment in app.deployments().get_latest_deployments() {
                        println!("  {}", deployment_line(&deployment, now));
                    }
                }
                Ok(DeploymentsEvent::WillChange) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(()),
            },
            view = status.recv() => match view {
                Ok(view) => println!("Status: {}", view.text),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

/// `RUST_LOG` wins over the configured level; `--verbose` wins over both.
fn init_logging(verbose: bool, log_level: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if verbose {
        EnvFilter::new("mirror=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
