//! Import run listing and recovery

use anyhow::Result;
use tally_core::db::Database;
use tally_core::ImportStatus;

use super::truncate;

pub fn cmd_imports(db: &Database, user_id: Option<i64>, limit: i64) -> Result<()> {
    let imports = db.list_imports(user_id, limit)?;

    if imports.is_empty() {
        println!("No imports found.");
        return Ok(());
    }

    println!(
        "{:>6}  {:>6}  {:<8}  {:<10}  {:<19}  {:<19}",
        "ID", "USER", "TYPE", "STATUS", "STARTED", "FINISHED"
    );
    println!("{}", "─".repeat(78));

    for import in imports {
        let icon = match import.status {
            ImportStatus::Processing => "⏳",
            ImportStatus::Completed => "✅",
            ImportStatus::Failed => "❌",
        };
        let started = import.started_at.format("%Y-%m-%d %H:%M:%S").to_string();
        let finished = import
            .completed_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:>6}  {:>6}  {:<8}  {} {:<8}  {:<19}  {:<19}",
            import.id,
            import.user_id,
            import.import_type,
            icon,
            import.status.as_str(),
            started,
            finished
        );
        if let Some(error) = &import.error {
            println!("        {}", truncate(error, 70));
        }
    }

    Ok(())
}

pub fn cmd_recover(db: &Database) -> Result<()> {
    let recovered = db.recover_stuck_imports()?;
    if recovered == 0 {
        println!("✅ No stuck imports.");
    } else {
        println!("🔧 Marked {} stuck import(s) as failed", recovered);
    }
    Ok(())
}
