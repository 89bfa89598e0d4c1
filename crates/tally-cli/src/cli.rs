//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Import card and bank exports with clean merchant names
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Financial transaction import pipeline", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "tally.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TALLY_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Config file (defaults to ~/.local/share/tally/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and seed default categories
    Init,

    /// Import a provider CSV export for a user
    Import {
        /// Owning user id
        #[arg(short, long)]
        user: i64,

        /// CSV file to import
        #[arg(short, long)]
        file: PathBuf,

        /// Provider format
        #[arg(short, long, default_value = "amex")]
        provider: String,

        /// Currency code for imported rows (overrides config)
        #[arg(long)]
        currency: Option<String>,
    },

    /// List import runs
    Imports {
        /// Only show imports for this user
        #[arg(short, long)]
        user: Option<i64>,

        /// Maximum number of imports to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Mark imports left in `processing` by a crashed run as failed
    Recover,

    /// Manage the allowed category labels
    Categories {
        #[command(subcommand)]
        action: Option<CategoriesAction>,
    },

    /// Show learned normalizations
    Cache {
        /// Cache to show: merchant or category
        #[arg(short, long, default_value = "merchant")]
        kind: String,

        /// Maximum number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
}

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// List allowed categories
    List,

    /// Add an allowed category
    Add {
        /// Category label
        name: String,

        /// Short description shown to administrators
        #[arg(short, long)]
        description: Option<String>,
    },
}
