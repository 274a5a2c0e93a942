//! Noema - CLI entry point for the cognitive core

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use noema::cli::{Cli, Command};
use noema::config::Config;
use noema::core::CognitiveCore;
use noema::snapshot::{LoadOutcome, SnapshotStore};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let level = cli_log_level
        .or(config_log_level)
        .unwrap_or("info")
        .to_lowercase();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref())
        .context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Some(Command::Run) | None => cmd_run(config).await,
        Some(Command::Snapshot) => cmd_snapshot(config),
        Some(Command::Version) => {
            println!("noe {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn cmd_run(config: Config) -> Result<()> {
    let core = CognitiveCore::start(config).await?;
    info!("core running; ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("interrupt received");

    core.stop().await
}

fn cmd_snapshot(config: Config) -> Result<()> {
    let store = SnapshotStore::new(config.snapshot_path());
    match store.load() {
        LoadOutcome::Loaded(snapshot) | LoadOutcome::RecoveredFromPrev(snapshot) => {
            println!("taken_at:    {}", snapshot.taken_at);
            println!("schema:      {}", snapshot.schema_version);
            println!("cycle_count: {}", snapshot.loop_state.cycle_count);
            println!("wake_state:  {}", snapshot.wake_state);
            println!("goals:       {}", snapshot.goals.len());
            println!("skills:      {}", snapshot.skills.len());
            println!("interests:   {}", snapshot.interests.len());
            println!(
                "hypergraph:  {} nodes, {} edges",
                snapshot.hypergraph_summary.node_count, snapshot.hypergraph_summary.edge_count
            );
        }
        LoadOutcome::Fresh => {
            println!("no snapshot at {}", store.path().display());
        }
    }
    Ok(())
}
