use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wl_cli::commands::{pulls, report};
use wl_cli::{Cli, Commands, Config, PullsAction};

/// Load config and open the pull-mark cache, ensuring its directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(wl_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = wl_db::Database::open(&config.database_path).with_context(|| {
        format!("failed to open {}", config.database_path.display())
    })?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // try_init: tests may have installed a subscriber already
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let mut stdout = io::stdout().lock();
    match &cli.command {
        Some(Commands::Report(args)) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            report::run(&mut stdout, &mut db, &config, args)?;
        }
        Some(Commands::Pulls(action)) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            match action {
                PullsAction::Record { repos } => pulls::record(&mut stdout, &mut db, repos)?,
                PullsAction::List { project } => {
                    let offset = config
                        .analysis
                        .local_offset()
                        .context("invalid analysis settings")?;
                    pulls::list(&mut stdout, &db, project.as_deref(), offset)?;
                }
            }
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
