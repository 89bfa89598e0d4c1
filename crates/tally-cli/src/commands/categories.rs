//! Allowed category management

use anyhow::{Context, Result};
use tally_core::db::Database;

pub fn cmd_categories_list(db: &Database) -> Result<()> {
    let categories = db.list_default_categories()?;

    if categories.is_empty() {
        println!("No categories configured. Run 'tally init' to seed the defaults.");
        return Ok(());
    }

    println!("📂 Allowed categories ({}):", categories.len());
    for name in categories {
        println!("   {}", name);
    }

    Ok(())
}

pub fn cmd_categories_add(db: &Database, name: &str, description: Option<&str>) -> Result<()> {
    let added = db
        .add_default_category(name, description)
        .with_context(|| format!("Failed to add category '{}'", name))?;

    if added {
        println!("✅ Added category: {}", name.trim());
    } else {
        println!("Category already exists: {}", name.trim());
    }

    Ok(())
}
