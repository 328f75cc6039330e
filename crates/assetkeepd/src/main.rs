//! Asset keeper daemon
//!
//! `assetkeepd` serves the retention API and exposes the same operations as
//! one-shot commands for operators and cron jobs.
//!
//! ## Commands
//!
//! - `serve`: run the HTTP API
//! - `deprecate`: run one deprecation pass and print the report
//! - `needed`: print the locators that must be kept
//! - `cover-link`: print the latest coverage report of a manager

mod error;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use assetkeep_core::{AssetKeeper, RetentionConfig};
use assetkeep_state::{EntityStore, SurrealEntityStore};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "assetkeepd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build artifact retention service", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Use an in-process database instead of SURREALDB_* (state is lost on exit)
    #[arg(long, global = true)]
    memory: bool,

    #[command(flatten)]
    retention: RetentionArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the `ASSETKEEP_*_DAYS` environment settings.
#[derive(Args, Debug, Default)]
struct RetentionArgs {
    /// Days bug-tied assets are kept after their last bug closed
    #[arg(long, global = true)]
    closed_bug_embargo_days: Option<u32>,

    /// Days a superseded coverage report is kept after its upload
    #[arg(long, global = true)]
    supersession_embargo_days: Option<u32>,

    /// Days a bug-tied asset is kept regardless of bugs (0 disables)
    #[arg(long, global = true)]
    fresh_asset_grace_days: Option<u32>,
}

impl RetentionArgs {
    fn apply(&self, mut config: RetentionConfig) -> RetentionConfig {
        if let Some(days) = self.closed_bug_embargo_days {
            config.closed_bug_embargo_days = days;
        }
        if let Some(days) = self.supersession_embargo_days {
            config.supersession_embargo_days = days;
        }
        if let Some(days) = self.fresh_asset_grace_days {
            config.fresh_asset_grace_days = days;
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, env = "ASSETKEEP_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
    },

    /// Run one deprecation pass now
    Deprecate,

    /// List locators that are still needed
    Needed {
        /// Restrict to one namespace
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Show the latest coverage report of a build manager
    CoverLink {
        #[arg(short, long)]
        namespace: String,

        #[arg(short, long)]
        manager: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    assetkeep_core::init_tracing(cli.json, level);

    let config = cli
        .retention
        .apply(RetentionConfig::from_env().context("Invalid retention settings")?);
    let store = open_store(cli.memory).await?;
    let keeper = AssetKeeper::new(store, config);

    match cli.command {
        Commands::Serve { bind } => cmd_serve(keeper, bind).await,
        Commands::Deprecate => cmd_deprecate(&keeper).await,
        Commands::Needed { namespace } => cmd_needed(&keeper, namespace.as_deref()).await,
        Commands::CoverLink { namespace, manager } => {
            cmd_cover_link(&keeper, &namespace, &manager).await
        }
    }
}

async fn open_store(memory: bool) -> Result<Arc<dyn EntityStore>> {
    let store = if memory {
        tracing::warn!("using in-process database; state is lost on exit");
        SurrealEntityStore::in_memory().await
    } else {
        SurrealEntityStore::from_env().await
    }
    .context("Failed to connect to asset database")?;
    Ok(Arc::new(store))
}

async fn cmd_serve(keeper: routes::Keeper, bind: SocketAddr) -> Result<()> {
    info!(
        closed_bug_embargo_days = keeper.config().closed_bug_embargo_days,
        supersession_embargo_days = keeper.config().supersession_embargo_days,
        fresh_asset_grace_days = keeper.config().fresh_asset_grace_days,
        "retention windows"
    );
    let app = routes::router(keeper);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!(event = "server.listening", addr = %bind);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result.context("Server error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }
    Ok(())
}

async fn cmd_deprecate(keeper: &routes::Keeper) -> Result<()> {
    let report = keeper.run_deprecation().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_needed(keeper: &routes::Keeper, namespace: Option<&str>) -> Result<()> {
    for url in keeper.list_needed(namespace).await? {
        println!("{url}");
    }
    Ok(())
}

async fn cmd_cover_link(keeper: &routes::Keeper, namespace: &str, manager: &str) -> Result<()> {
    match keeper.cover_link(namespace, manager).await? {
        Some(url) => println!("{url}"),
        None => println!("No coverage report for {manager} in {namespace}"),
    }
    Ok(())
}
