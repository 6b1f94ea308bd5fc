//! # metafuse
//!
//! metafuse projects an event-sourced metadata store into an organized,
//! read-only virtual filesystem. An external writer persists per-file
//! properties in a shared key-value store and appends every mutation to an
//! ordered change log; this service consumes that log, applies the
//! user-configurable rename rules, and answers filesystem queries for the
//! kernel driver and the file-sharing gateway over a local HTTP API.
//!
//! ## Commands
//!
//! - `metafuse serve` - consume the change log and serve the query API
//! - `metafuse config show` - print the effective configuration
//! - `metafuse config init` - print a sample configuration file
//! - `metafuse config path` - print the config file location
//!
//! ## Examples
//!
//! ```bash
//! # Run against a local store
//! METAFUSE_STORE_URL=redis://localhost:6379 metafuse serve
//!
//! # Inspect the projection
//! curl -s localhost:3000/api/fuse/stats | jq
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use metafuse_api::AppState;
use metafuse_rules::RuleConfigStore;
use metafuse_state::StateService;
use metafuse_store::RedisStore;
use metafuse_vfs::Vfs;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "metafuse")]
#[command(about = "Metadata-to-virtual-filesystem projection engine")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/metafuse/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume the change log and serve the query API
    Serve,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show effective configuration
    Show,
    /// Print sample configuration file
    Init,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = Config::load(cli.config.clone()).context("Failed to load config")?;

    match cli.command {
        Commands::Serve => serve(config).await?,

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!(
                    "{}",
                    toml::to_string_pretty(&config).context("Failed to serialize config")?
                );
            }
            ConfigAction::Init => {
                println!("{}", Config::sample_toml());
            }
            ConfigAction::Path => {
                if let Some(path) = Config::config_path() {
                    println!("{}", path.display());
                } else {
                    println!("Could not determine config directory");
                }
            }
        },
    }

    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    info!(
        "starting metafuse (files_root={}, store={})",
        config.files.files_root, config.store.store_url
    );

    // Store connection. The manager reconnects on its own; commands fail
    // fast while the link is down.
    let store = RedisStore::connect(&config.store.store_url, config.store.store_prefix.clone())
        .await
        .with_context(|| format!("Failed to connect to store at {}", config.store.store_url))?;
    let store = Arc::new(store);

    // Rule config, seeded with defaults on first run.
    let rules_store = Arc::new(RuleConfigStore::new(Config::rules_dir()));
    let rule_config = rules_store.load();
    info!(
        rules = rule_config.rules.len(),
        default = rule_config.is_default,
        "rule config loaded"
    );

    // Projection and event loop.
    let vfs = Arc::new(Vfs::new(config.vfs_config(), &rule_config));
    let service = Arc::new(StateService::new(
        store,
        Arc::clone(&vfs),
        Arc::clone(&rules_store),
        &rule_config,
        config.state_config(),
    ));
    let event_task = metafuse_state::spawn(Arc::clone(&service));

    // Query API, served concurrently from the first moment; the event task
    // fills the projection behind it.
    let state = AppState::new(
        Arc::clone(&vfs),
        Arc::clone(&service),
        rules_store,
        config.files.files_root.clone(),
        Duration::from_secs(config.api.startup_grace_secs),
    );

    tokio::select! {
        result = metafuse_api::serve(state, &config.api.api_host, config.api.api_port) => {
            result.context("API server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    service.stop();
    let _ = event_task.await;
    info!("bye");
    Ok(())
}
