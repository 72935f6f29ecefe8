//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "shopdb",
    version,
    about = "Apply and revert the shop database schema",
    after_help = "Examples:\n  \
    shopdb upgrade\n  \
    shopdb downgrade --to init_schema_orders\n  \
    shopdb --database ./shop.db current"
)]
pub struct Cli {
    /// SQLite database file.  Defaults to the platform data directory.
    #[arg(long, global = true, env = "SHOPDB_DATABASE_PATH")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Apply pending migrations up to a revision (default: head)
    Upgrade {
        #[arg(long = "to", value_name = "REVISION")]
        target: Option<String>,
    },
    /// Revert applied migrations down to a revision (default: base)
    Downgrade {
        #[arg(long = "to", value_name = "REVISION")]
        target: Option<String>,
    },
    /// Print the revision currently applied
    Current,
    /// List every known revision, root first
    History,
    /// Print the table descriptors of every revision as JSON
    Show,
    /// Compare the live schema with the descriptors of the applied revision
    Verify,
}
