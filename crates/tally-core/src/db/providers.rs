//! Provider lookup

use rusqlite::params;

use super::Database;
use crate::error::{Error, Result};

impl Database {
    /// Row id of a provider by its code (e.g. `amex`)
    pub fn provider_id(&self, code: &str) -> Result<i64> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT id FROM providers WHERE code = ?",
            params![code],
            |row| row.get(0),
        );

        match result {
            Ok(id) => Ok(id),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(Error::NotFound(format!("Provider {}", code)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All known providers as (code, name, type)
    pub fn list_providers(&self) -> Result<Vec<(String, String, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT code, name, type FROM providers ORDER BY id")?;
        let providers = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(providers)
    }
}
