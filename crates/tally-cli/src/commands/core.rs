//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Config file loading
//! - `ai_client` - AI backend selection from the environment
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::{db::Database, AIBackend, AIClient, Config};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", db_path.display()))?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load the config file, falling back to defaults when none exists
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    Config::load(config_path).context("Failed to load config")
}

/// Build the AI client from the environment, applying the config's model
pub fn ai_client(config: &Config) -> Result<AIClient> {
    let client = AIClient::from_env().context(
        "No AI backend configured. Set GEMINI_API_KEY, or AI_BACKEND=openai_compatible \
         with OPENAI_COMPATIBLE_HOST",
    )?;

    let client = match &config.ai.model {
        Some(model) => client.with_model(model),
        None => client,
    };

    tracing::debug!(
        backend = client.backend_name(),
        model = client.model(),
        host = client.host(),
        "AI backend selected"
    );
    Ok(client)
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;

    let seeded = db
        .seed_default_categories()
        .context("Failed to seed default categories")?;
    println!("   Seeded {} default categories", seeded);

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Set GEMINI_API_KEY for merchant and category normalization");
    println!("  2. Import transactions: tally import --user 1 --file activity.csv");

    Ok(())
}
