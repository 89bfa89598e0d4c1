//! Import lifecycle operations
//!
//! An import is created in `processing` and moves exactly once to
//! `completed` or `failed`. The status guard lives in the UPDATE itself so a
//! second transition is detected without a read-modify-write race.

use rusqlite::params;

use super::{now_timestamp, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Import, ImportStatus};

const SELECT_COLUMNS: &str =
    "id, user_id, type, status, error, started_at, completed_at, created_at, updated_at";

impl Database {
    /// Create an import record in the `processing` state
    pub fn create_import(&self, user_id: i64, provider: &str) -> Result<i64> {
        let conn = self.conn()?;
        let now = now_timestamp();
        conn.execute(
            r#"
            INSERT INTO imports (user_id, type, status, started_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                user_id,
                provider,
                ImportStatus::Processing.as_str(),
                now,
                now,
                now
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Mark a processing import as completed
    pub fn mark_import_completed(&self, import_id: i64) -> Result<()> {
        self.finish_import(import_id, ImportStatus::Completed, None)
    }

    /// Mark a processing import as failed, recording the reason
    pub fn mark_import_failed(&self, import_id: i64, error: &str) -> Result<()> {
        self.finish_import(import_id, ImportStatus::Failed, Some(error))
    }

    fn finish_import(
        &self,
        import_id: i64,
        status: ImportStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let now = now_timestamp();
        let updated = conn.execute(
            r#"
            UPDATE imports SET
                status = ?,
                error = ?,
                completed_at = ?,
                updated_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
            params![status.as_str(), error, now, now, import_id],
        )?;

        if updated == 0 {
            return match self.get_import(import_id)? {
                Some(import) => Err(Error::InvalidData(format!(
                    "Import {} is already {}",
                    import_id, import.status
                ))),
                None => Err(Error::NotFound(format!("Import {}", import_id))),
            };
        }
        Ok(())
    }

    /// Get an import record by id
    pub fn get_import(&self, import_id: i64) -> Result<Option<Import>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            &format!("SELECT {} FROM imports WHERE id = ?", SELECT_COLUMNS),
            params![import_id],
            Self::map_import_row,
        );

        match result {
            Ok(import) => Ok(Some(import)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List imports, newest first, optionally for a single user
    pub fn list_imports(&self, user_id: Option<i64>, limit: i64) -> Result<Vec<Import>> {
        let conn = self.conn()?;

        let imports = if let Some(user_id) = user_id {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM imports WHERE user_id = ? ORDER BY id DESC LIMIT ?",
                SELECT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![user_id, limit], Self::map_import_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM imports ORDER BY id DESC LIMIT ?",
                SELECT_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![limit], Self::map_import_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        Ok(imports)
    }

    /// Fail imports left in `processing` by a process that died mid-run
    ///
    /// Call at startup before any new import begins. Returns the number of
    /// imports recovered.
    pub fn recover_stuck_imports(&self) -> Result<i64> {
        let conn = self.conn()?;
        let now = now_timestamp();
        let count = conn.execute(
            r#"UPDATE imports SET
                status = 'failed',
                error = 'Interrupted before completion. Please re-import the file.',
                completed_at = ?,
                updated_at = ?
            WHERE status = 'processing'"#,
            params![now, now],
        )?;
        Ok(count as i64)
    }

    fn map_import_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Import> {
        let status: String = row.get(3)?;
        let started_at: String = row.get(5)?;
        let completed_at: Option<String> = row.get(6)?;
        let created_at: String = row.get(7)?;
        let updated_at: String = row.get(8)?;

        Ok(Import {
            id: row.get(0)?,
            user_id: row.get(1)?,
            import_type: row.get(2)?,
            status: status.parse().unwrap_or(ImportStatus::Failed),
            error: row.get(4)?,
            started_at: parse_datetime(&started_at),
            completed_at: completed_at.as_deref().map(parse_datetime),
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }
}
