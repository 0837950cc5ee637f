use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::QuoteApp;
use crate::config::{AppConfig, ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::present::TerminalPresenter;
use crate::session::SessionStore;
use crate::storage;
use crate::sync::{HttpRemote, RemoteSource, StaticRemote};

pub mod commands;

use self::commands::{
    AddArgs, ExportArgs, FilterArgs, ImportArgs, ListArgs, ReviewArgs, SyncArgs, WatchArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "quotes",
    version,
    about = "Quote collection with category filters and remote sync"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over QUOTES_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over QUOTES_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show a random quote from the selected category (default)
    Show,
    /// Show the quote displayed last in this session again
    Last,
    /// Add a quote (prompted if arguments are omitted)
    Add(AddArgs),
    /// List quotes in the selected category
    List(ListArgs),
    /// List known categories, marking the selected one
    Categories,
    /// Select the category filter ("All" clears it)
    Filter(FilterArgs),
    /// Write every quote to a JSON file
    Export(ExportArgs),
    /// Append quotes from a JSON array file
    Import(ImportArgs),
    /// Fetch remote quotes and merge them into the local store
    Sync(SyncArgs),
    /// Review conflicts left by the last sync
    Review(ReviewArgs),
    /// Accept every server value from the last sync
    Dismiss,
    /// Send the whole local store to the server
    Push,
    /// Sync periodically until interrupted or the cycle limit is reached
    Watch(WatchArgs),
    /// Forget session values (last quote, pending review)
    EndSession,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = Arc::new(loader.load_or_init()?);
    let storage = storage::init(&config.storage)?;
    let session = SessionStore::new(config.storage.session_file.clone());
    let remote = build_remote(&config)?;

    let mut app = QuoteApp::new(
        config.clone(),
        storage,
        session,
        remote,
        TerminalPresenter::stdout(),
    )?;

    let command = cli.command.unwrap_or(Commands::Show);
    match command {
        Commands::Show => commands::show(&mut app),
        Commands::Last => commands::last(&mut app),
        Commands::Add(args) => commands::add(&mut app, args),
        Commands::List(args) => commands::list(&mut app, args),
        Commands::Categories => commands::categories(&mut app),
        Commands::Filter(args) => commands::filter(&mut app, args),
        Commands::Export(args) => commands::export(&mut app, args),
        Commands::Import(args) => commands::import(&mut app, args),
        Commands::Sync(args) => commands::sync(&mut app, args),
        Commands::Review(args) => commands::review(&mut app, args),
        Commands::Dismiss => commands::dismiss(&mut app),
        Commands::Push => commands::push(&mut app),
        Commands::Watch(args) => commands::watch(&mut app, args),
        Commands::EndSession => commands::end_session(&mut app),
    }
}

fn build_remote(config: &AppConfig) -> Result<Arc<dyn RemoteSource>> {
    if config.sync.endpoint.trim().is_empty() {
        tracing::info!("no sync endpoint configured, serving offline quotes");
        return Ok(Arc::new(StaticRemote::offline()));
    }
    let remote = HttpRemote::new(&config.sync).context("configuring sync endpoint")?;
    tracing::debug!(endpoint = remote.endpoint(), "syncing against remote endpoint");
    Ok(Arc::new(remote))
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
