//! CSV import command

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::{db::Database, import::ImportSummary, AIClient, Config, CsvImporter, Provider};

pub async fn cmd_import(
    db_path: &Path,
    config_path: Option<&Path>,
    user_id: i64,
    file: &Path,
    provider_str: &str,
    currency: Option<&str>,
    no_encrypt: bool,
) -> Result<()> {
    let provider: Provider = provider_str.parse()?;

    let mut config = super::load_config(config_path)?;
    if let Some(currency) = currency {
        config.import = config.import.with_currency(currency)?;
    }

    let db = super::open_db(db_path, no_encrypt)?;
    let ai = super::ai_client(&config)?;

    println!(
        "📥 Importing {} export from {}...",
        provider.display_name(),
        file.display()
    );

    let summary = run_import(&db, &ai, &config, user_id, provider, file).await?;
    print_summary(&summary);

    Ok(())
}

/// Run one import inline and return its summary
///
/// The import record is left `failed` with the error text when this errors.
pub async fn run_import(
    db: &Database,
    ai: &AIClient,
    config: &Config,
    user_id: i64,
    provider: Provider,
    file: &Path,
) -> Result<ImportSummary> {
    let importer =
        CsvImporter::new(db, ai, config.import.clone()).with_temperature(config.ai.temperature);

    let import_id = importer
        .begin(user_id, provider)
        .context("Failed to create import record")?;

    importer
        .process_import(import_id, user_id, provider, file)
        .await
        .with_context(|| format!("Import {} failed", import_id))
}

fn print_summary(summary: &ImportSummary) {
    println!("✅ Import {} complete!", summary.import_id);
    println!("   Rows: {} ({} chunks)", summary.rows, summary.chunks);
    println!(
        "   Merchants: {} cached, {} by pattern, {} by AI",
        summary.merchants.exact, summary.merchants.regex, summary.merchants.ai
    );
    if summary.categories.total() > 0 {
        println!(
            "   Categories: {} cached, {} by pattern, {} by AI",
            summary.categories.exact, summary.categories.regex, summary.categories.ai
        );
    }
}
