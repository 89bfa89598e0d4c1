//! Merchant and category normalization cache
//!
//! Both kinds share one table layout (see [`NormalizationKind`] for the
//! table and column names). Entries are shared by every import run, so all
//! writes here are conflict-tolerant upserts rather than plain inserts.

use rusqlite::{params, ToSql};
use std::collections::HashMap;

use super::{now_timestamp, parse_datetime, Database};
use crate::error::Result;
use crate::models::{DetectionMethod, NewNormalization, NormalizationEntry, NormalizationKind};

/// Upper bound on rows bound into a single statement
const ROWS_PER_STATEMENT: usize = 500;

fn placeholders(n: usize, width: usize) -> String {
    let row = format!("({})", vec!["?"; width].join(", "));
    vec![row.as_str(); n].join(", ")
}

impl Database {
    /// Look up exact cache hits for a set of raw strings
    pub fn find_exact_normalizations(
        &self,
        kind: NormalizationKind,
        raws: &[String],
    ) -> Result<HashMap<String, String>> {
        let mut found = HashMap::new();
        if raws.is_empty() {
            return Ok(found);
        }

        let conn = self.conn()?;
        for batch in raws.chunks(ROWS_PER_STATEMENT) {
            let sql = format!(
                "SELECT {raw}, {norm} FROM {table} WHERE {raw} IN ({list})",
                raw = kind.raw_column(),
                norm = kind.normalized_column(),
                table = kind.table(),
                list = vec!["?"; batch.len()].join(", "),
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(batch.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (raw, normalized) = row?;
                found.insert(raw, normalized);
            }
        }

        Ok(found)
    }

    /// All entries carrying a regex pattern, oldest first
    ///
    /// Creation order makes first-match-wins deterministic.
    pub fn list_regex_normalizations(
        &self,
        kind: NormalizationKind,
    ) -> Result<Vec<NormalizationEntry>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT id, {raw}, {norm}, regex_pattern, detection_method, created_at, updated_at
            FROM {table}
            WHERE regex_pattern IS NOT NULL AND regex_pattern != ''
            ORDER BY id ASC
            "#,
            raw = kind.raw_column(),
            norm = kind.normalized_column(),
            table = kind.table(),
        );

        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map([], Self::map_normalization_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Record raw strings resolved through an existing pattern
    ///
    /// Stored without a pattern so they hit the exact tier next time. A raw
    /// string already present is left untouched.
    pub fn insert_regex_matches(
        &self,
        kind: NormalizationKind,
        matches: &[(String, String)],
    ) -> Result<usize> {
        if matches.is_empty() {
            return Ok(0);
        }

        let conn = self.conn()?;
        let now = now_timestamp();
        let mut inserted = 0;

        for batch in matches.chunks(ROWS_PER_STATEMENT) {
            let sql = format!(
                r#"
                INSERT INTO {table} ({raw}, {norm}, regex_pattern, detection_method, created_at, updated_at)
                VALUES {values}
                ON CONFLICT({raw}) DO NOTHING
                "#,
                table = kind.table(),
                raw = kind.raw_column(),
                norm = kind.normalized_column(),
                values = placeholders(batch.len(), 6),
            );

            let mut values: Vec<Box<dyn ToSql>> = Vec::with_capacity(batch.len() * 6);
            for (raw, normalized) in batch {
                values.push(Box::new(raw.clone()));
                values.push(Box::new(normalized.clone()));
                values.push(Box::new(Option::<String>::None));
                values.push(Box::new(DetectionMethod::Regex.as_str()));
                values.push(Box::new(now.clone()));
                values.push(Box::new(now.clone()));
            }

            inserted += conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        }

        Ok(inserted)
    }

    /// Persist AI-learned normalizations
    ///
    /// Keyed on `regex_pattern`: if another run already learned the same
    /// pattern, its label is refreshed instead of inserting a second row.
    /// A raw string that already has an entry is left as is. Callers must
    /// not pass the same non-null pattern twice in one batch.
    pub fn upsert_learned_normalizations(
        &self,
        kind: NormalizationKind,
        entries: &[NewNormalization],
    ) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let conn = self.conn()?;
        let now = now_timestamp();
        let mut affected = 0;

        for batch in entries.chunks(ROWS_PER_STATEMENT) {
            let sql = format!(
                r#"
                INSERT INTO {table} ({raw}, {norm}, regex_pattern, detection_method, created_at, updated_at)
                VALUES {values}
                ON CONFLICT(regex_pattern) DO UPDATE SET
                    {norm} = excluded.{norm},
                    detection_method = excluded.detection_method,
                    updated_at = excluded.updated_at
                ON CONFLICT({raw}) DO NOTHING
                "#,
                table = kind.table(),
                raw = kind.raw_column(),
                norm = kind.normalized_column(),
                values = placeholders(batch.len(), 6),
            );

            let mut values: Vec<Box<dyn ToSql>> = Vec::with_capacity(batch.len() * 6);
            for entry in batch {
                values.push(Box::new(entry.raw.clone()));
                values.push(Box::new(entry.normalized.clone()));
                values.push(Box::new(entry.regex_pattern.clone()));
                values.push(Box::new(DetectionMethod::Ai.as_str()));
                values.push(Box::new(now.clone()));
                values.push(Box::new(now.clone()));
            }

            affected += conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
        }

        Ok(affected)
    }

    /// Add a hand-curated exact mapping, replacing any existing label for it
    pub fn seed_normalization(
        &self,
        kind: NormalizationKind,
        raw: &str,
        normalized: &str,
        regex_pattern: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let now = now_timestamp();
        let sql = format!(
            r#"
            INSERT INTO {table} ({raw}, {norm}, regex_pattern, detection_method, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT({raw}) DO UPDATE SET
                {norm} = excluded.{norm},
                regex_pattern = excluded.regex_pattern,
                detection_method = excluded.detection_method,
                updated_at = excluded.updated_at
            "#,
            table = kind.table(),
            raw = kind.raw_column(),
            norm = kind.normalized_column(),
        );

        conn.execute(
            &sql,
            params![
                raw,
                normalized,
                regex_pattern,
                DetectionMethod::ExactSeed.as_str(),
                now,
                now
            ],
        )?;
        Ok(())
    }

    /// List cache entries, oldest first
    pub fn list_normalizations(
        &self,
        kind: NormalizationKind,
        limit: i64,
    ) -> Result<Vec<NormalizationEntry>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT id, {raw}, {norm}, regex_pattern, detection_method, created_at, updated_at
            FROM {table}
            ORDER BY id ASC
            LIMIT ?
            "#,
            raw = kind.raw_column(),
            norm = kind.normalized_column(),
            table = kind.table(),
        );

        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![limit], Self::map_normalization_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Number of entries in a cache table
    pub fn count_normalizations(&self, kind: NormalizationKind) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_normalization_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NormalizationEntry> {
        let method: String = row.get(4)?;
        let created_at: String = row.get(5)?;
        let updated_at: String = row.get(6)?;

        Ok(NormalizationEntry {
            id: row.get(0)?,
            raw: row.get(1)?,
            normalized: row.get(2)?,
            regex_pattern: row.get(3)?,
            detection_method: method.parse().unwrap_or_default(),
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }
}
