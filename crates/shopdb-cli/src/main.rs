//! # shopdb
//!
//! Operator entry point for the shop database schema.  Opens the configured
//! SQLite file without auto-migrating and runs exactly the requested
//! transition.

mod cli;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shopdb_store::{Database, Environment, Migrator, StoreConfig};

use crate::cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,shopdb=debug,shopdb_store=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    // -----------------------------------------------------------------------
    // 2. Load the dotenv file for the environment, then the configuration
    // -----------------------------------------------------------------------
    let environment = Environment::parse(&std::env::var("SHOPDB_ENV").unwrap_or_default());
    match dotenvy::from_filename(environment.dotenv_file()) {
        Ok(path) => info!(path = %path.display(), "Loaded dotenv file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable dotenv file"),
    }

    let cli = Cli::parse();

    let mut config = StoreConfig::from_env();
    if let Some(path) = cli.database {
        config.database_path = Some(path);
    }
    // Every transition is explicit here.
    config.auto_migrate = false;

    // -----------------------------------------------------------------------
    // 3. Run the command
    // -----------------------------------------------------------------------
    let migrator = Migrator::default();

    match cli.command {
        Command::Upgrade { target } => {
            let applied = open(&config)?
                .upgrade(target.as_deref())
                .context("upgrade failed")?;
            if applied.is_empty() {
                info!("Database already at target revision");
            }
            for revision in applied {
                println!("applied {revision}");
            }
        }
        Command::Downgrade { target } => {
            let reverted = open(&config)?
                .downgrade(target.as_deref())
                .context("downgrade failed")?;
            if reverted.is_empty() {
                info!("Nothing to revert");
            }
            for revision in reverted {
                println!("reverted {revision}");
            }
        }
        Command::Current => {
            let current = open_read_only(&config)?.current_revision()?;
            println!("{}", current.as_deref().unwrap_or("base"));
        }
        Command::History => {
            let current = open_read_only(&config)?.current_revision()?;
            for m in migrator.history()? {
                let parent = m.down_revision.unwrap_or("base");
                let marker = if current.as_deref() == Some(m.revision) {
                    " (current)"
                } else {
                    ""
                };
                println!("{parent} -> {}{marker}  {}", m.revision, m.description);
            }
        }
        Command::Show => {
            // Descriptors only; no database needed.
            println!("{}", migrator.describe()?);
        }
        Command::Verify => {
            let db = open_read_only(&config)?;
            db.verify_schema().context("schema verification failed")?;
            println!(
                "schema matches revision {}",
                db.current_revision()?.as_deref().unwrap_or("base")
            );
        }
    }

    Ok(())
}

fn open(config: &StoreConfig) -> anyhow::Result<Database> {
    Database::open(config).context("failed to open database")
}

/// Inspection commands never create or modify the database file.
fn open_read_only(config: &StoreConfig) -> anyhow::Result<Database> {
    let path = config.resolve_path()?;
    Database::open_read_only(&path)
        .with_context(|| format!("failed to open {} read-only", path.display()))
}
