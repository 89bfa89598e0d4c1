//! Default category operations
//!
//! The allowed category labels the AI may choose from when normalizing
//! provider categories.

use rusqlite::params;
use tracing::info;

use super::Database;
use crate::error::{Error, Result};

/// Labels seeded by `tally init`
pub const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Shopping", "Retail purchases, online and in store"),
    ("Groceries", "Supermarkets and food shops"),
    ("Restaurants", "Restaurants, cafes, takeaways and bars"),
    ("Transportation", "Public transport, taxis, fuel and travel"),
    ("Health", "Pharmacies, medical and fitness"),
    ("Entertainment", "Streaming, events, games and leisure"),
    ("Bills", "Utilities, phone, insurance and subscriptions"),
    ("Transfers", "Card payments, refunds and account transfers"),
    ("Misc", "Anything else"),
];

impl Database {
    /// Names of the allowed categories, in insertion order
    pub fn list_default_categories(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name FROM default_categories ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Add an allowed category; returns false if it already existed
    pub fn add_default_category(&self, name: &str, description: Option<&str>) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidData("Category name cannot be empty".into()));
        }

        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO default_categories (name, description) VALUES (?, ?)",
            params![name, description],
        )?;
        Ok(inserted > 0)
    }

    /// Insert the built-in category set; returns how many were new
    pub fn seed_default_categories(&self) -> Result<usize> {
        let mut added = 0;
        for (name, description) in DEFAULT_CATEGORIES {
            if self.add_default_category(name, Some(description))? {
                added += 1;
            }
        }

        if added > 0 {
            info!("Seeded {} default categories", added);
        }
        Ok(added)
    }
}
