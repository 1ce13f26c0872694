mod commands;
mod render;
mod sources;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use proxtree_core::config::{ConfigError, ProxtreeConfig};
use proxtree_core::model::Item;
use proxtree_core::persist::GroupFileWriter;
use proxtree_core::session::{Session, SessionOptions};
use proxtree_core::source::{ItemSource, JsonFileSource};

use sources::SimulatedSource;

#[derive(Parser)]
#[command(name = "proxtree")]
#[command(about = "Group, filter and watch a polled VM list", long_about = None)]
struct Cli {
    /// Config file (default: discover proxtree.yaml upwards from the cwd)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Group file, overriding the config
    #[arg(short, long, global = true)]
    groups: Option<PathBuf>,

    /// Item list JSON, overriding the config; without one a simulated fleet
    /// is used
    #[arg(short, long, global = true)]
    items: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and edit groups
    Groups {
        #[command(subcommand)]
        command: commands::GroupsCommand,
    },
    /// Print the tree once
    Tree(commands::TreeArgs),
    /// Keep polling and print the tree whenever it changes; reads commands
    /// from stdin
    Watch(commands::WatchArgs),
}

/// Resolved configuration shared by every subcommand.
pub struct AppContext {
    pub config: ProxtreeConfig,
}

impl AppContext {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions::from_config(&self.config)
    }

    pub fn open_session(&self) -> Session {
        Session::open(
            GroupFileWriter::new(&self.config.groups_file),
            self.session_options(),
        )
    }

    pub fn item_source(&self) -> Box<dyn ItemSource> {
        match &self.config.items_file {
            Some(path) => Box::new(JsonFileSource::new(path)),
            None => Box::new(SimulatedSource::new()),
        }
    }

    /// One fetch from whatever source is configured.
    pub async fn fetch_items(&self) -> anyhow::Result<Vec<Item>> {
        let mut source = self.item_source();
        let items = source
            .fetch()
            .await
            .with_context(|| format!("fetching items from {} source", source.name()))?;
        debug!(source = source.name(), count = items.len(), "items fetched");
        Ok(items)
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<ProxtreeConfig> {
    if let Some(path) = explicit {
        let config = ProxtreeConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?;
        info!(path = %path.display(), "config loaded");
        return Ok(config.resolve_paths(path));
    }

    let cwd = std::env::current_dir().context("reading current directory")?;
    match ProxtreeConfig::discover(&cwd) {
        Ok((path, config)) => {
            info!(path = %path.display(), "config loaded");
            Ok(config.resolve_paths(&path))
        }
        Err(ConfigError::NotFound { .. }) => {
            debug!("no config file found, using defaults");
            Ok(ProxtreeConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(groups) = cli.groups {
        config.groups_file = groups;
    }
    if let Some(items) = cli.items {
        config.items_file = Some(items);
    }
    let ctx = AppContext { config };

    match cli.command {
        Commands::Groups { command } => commands::run_groups(&ctx, command).await,
        Commands::Tree(args) => commands::run_tree(&ctx, args).await,
        Commands::Watch(args) => commands::run_watch(&ctx, args).await,
    }
}
