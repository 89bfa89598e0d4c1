//! Tally CLI - Financial transaction import pipeline
//!
//! Usage:
//!   tally init                                 Initialize database
//!   tally import --user 1 --file activity.csv  Import an Amex export
//!   tally imports                              List import runs
//!   tally cache --kind merchant                Show learned merchant names

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Import {
            user,
            file,
            provider,
            currency,
        } => {
            commands::cmd_import(
                &cli.db,
                cli.config.as_deref(),
                user,
                &file,
                &provider,
                currency.as_deref(),
                cli.no_encrypt,
            )
            .await
        }
        Commands::Imports { user, limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_imports(&db, user, limit)
        }
        Commands::Recover => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_recover(&db)
        }
        Commands::Categories { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(CategoriesAction::List) => commands::cmd_categories_list(&db),
                Some(CategoriesAction::Add { name, description }) => {
                    commands::cmd_categories_add(&db, &name, description.as_deref())
                }
            }
        }
        Commands::Cache { kind, limit } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_cache(&db, &kind, limit)
        }
    }
}
