use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::api::{HttpGateway, NotesGateway};
use crate::app::App;
use crate::config::ConfigLoader;

pub mod commands;

use self::commands::{DeleteArgs, ListArgs, NewArgs, RegisterArgs};

#[derive(Parser, Debug)]
#[command(
    name = "notecli",
    version,
    about = "Keyboard-first terminal client for a personal notes service"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over NOTECLI_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the server base URL from the config file
    #[arg(long)]
    pub server: Option<String>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive TUI (default)
    Tui,
    /// List notes non-interactively, optionally filtered by a search query
    List(ListArgs),
    /// Create a new note from the command line
    New(NewArgs),
    /// Delete a note by id (asks for confirmation unless --yes)
    Delete(DeleteArgs),
    /// Register a new account
    Register(RegisterArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("NOTECLI_CONFIG", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let mut config = loader.load_or_init()?;
    if let Some(server) = cli.server {
        config.server.base_url = server;
    }

    let base_url = config.server.base_url()?;
    tracing::debug!(%base_url, "connecting to notes service");
    let gateway: Arc<dyn NotesGateway> = Arc::new(
        HttpGateway::new(base_url, config.server.timeout()).context("building HTTP client")?,
    );

    let config = Arc::new(config);
    match cli.command.unwrap_or(Commands::Tui) {
        Commands::Tui => App::new(config, gateway).run(),
        Commands::List(args) => commands::list_notes(gateway.as_ref(), args),
        Commands::New(args) => commands::new_note(gateway.as_ref(), args),
        Commands::Delete(args) => {
            commands::delete_note(gateway.as_ref(), args, commands::prompt_confirm)
        }
        Commands::Register(args) => commands::register(gateway.as_ref(), args),
    }
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
