//! Normalization cache inspection

use anyhow::{anyhow, Result};
use tally_core::db::Database;
use tally_core::NormalizationKind;

use super::truncate;

pub fn cmd_cache(db: &Database, kind: &str, limit: i64) -> Result<()> {
    let kind: NormalizationKind = kind
        .parse()
        .map_err(|e: String| anyhow!("{}. Use 'merchant' or 'category'", e))?;

    let total = db.count_normalizations(kind)?;
    let entries = db.list_normalizations(kind, limit)?;

    println!("🧠 Learned {} normalizations: {} total", kind, total);
    if entries.is_empty() {
        return Ok(());
    }

    println!(
        "{:<36}  {:<24}  {:<10}  PATTERN",
        "RAW", "NORMALIZED", "METHOD"
    );
    println!("{}", "─".repeat(96));

    for entry in entries {
        println!(
            "{:<36}  {:<24}  {:<10}  {}",
            truncate(&entry.raw, 36),
            truncate(&entry.normalized, 24),
            entry.detection_method.as_str(),
            entry.regex_pattern.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
