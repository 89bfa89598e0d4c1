//! User transaction operations

use chrono::NaiveDate;
use rusqlite::{params, ToSql};
use tracing::debug;

use super::{now_timestamp, parse_datetime, Database};
use crate::error::Result;
use crate::models::{AccountType, NewUserTransaction, TransactionType, UserTransaction};

/// Columns written by the bulk upsert, in bind order
const INSERT_COLUMNS: &[&str] = &[
    "user_id",
    "provider_id",
    "account_type",
    "transaction_type",
    "transaction_id",
    "payee",
    "merchant",
    "category",
    "description",
    "transaction_date",
    "amount",
    "currency",
    "postcode",
    "country",
    "city",
    "import_id",
    "imported_at",
    "payload",
    "created_at",
    "updated_at",
];

/// Rows per INSERT statement, keeping bound parameters well under SQLite's limit
const ROWS_PER_STATEMENT: usize = 500;

const SELECT_COLUMNS: &str = r#"
    id, user_id, provider_id, account_type, transaction_type, transaction_id,
    payee, merchant, category, description, transaction_date, amount, currency,
    postcode, country, city, import_id, imported_at, payload, created_at, updated_at
"#;

fn upsert_sql(rows: usize) -> String {
    let placeholders = format!("({})", vec!["?"; INSERT_COLUMNS.len()].join(", "));
    let values = vec![placeholders.as_str(); rows].join(",\n");

    // Only normalization-affected and volatile fields refresh on re-import;
    // everything else keeps the value from the first import of this id.
    format!(
        r#"
        INSERT INTO user_transactions ({})
        VALUES {}
        ON CONFLICT(transaction_id) DO UPDATE SET
            merchant = excluded.merchant,
            category = excluded.category,
            amount = excluded.amount,
            transaction_date = excluded.transaction_date,
            payload = excluded.payload,
            updated_at = excluded.updated_at
        "#,
        INSERT_COLUMNS.join(", "),
        values
    )
}

impl Database {
    /// Insert or refresh a batch of transactions keyed by `transaction_id`
    ///
    /// The whole batch is written in one SQL transaction. Returns the number
    /// of rows inserted or updated.
    pub fn upsert_transactions(&self, transactions: &[NewUserTransaction]) -> Result<usize> {
        if transactions.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_timestamp();
        let mut affected = 0;

        for batch in transactions.chunks(ROWS_PER_STATEMENT) {
            let mut values: Vec<Box<dyn ToSql>> =
                Vec::with_capacity(batch.len() * INSERT_COLUMNS.len());

            for t in batch {
                values.push(Box::new(t.user_id));
                values.push(Box::new(t.provider_id));
                values.push(Box::new(t.account_type.as_str()));
                values.push(Box::new(t.transaction_type.as_str()));
                values.push(Box::new(t.transaction_id.clone()));
                values.push(Box::new(t.payee.clone()));
                values.push(Box::new(t.merchant.clone()));
                values.push(Box::new(t.category.clone()));
                values.push(Box::new(t.description.clone()));
                values.push(Box::new(t.transaction_date.to_string()));
                values.push(Box::new(t.amount.clone()));
                values.push(Box::new(t.currency.clone()));
                values.push(Box::new(t.postcode.clone()));
                values.push(Box::new(t.country.clone()));
                values.push(Box::new(t.city.clone()));
                values.push(Box::new(t.import_id));
                values.push(Box::new(now.clone()));
                values.push(Box::new(t.payload.clone()));
                values.push(Box::new(now.clone()));
                values.push(Box::new(now.clone()));
            }

            affected += tx.execute(
                &upsert_sql(batch.len()),
                rusqlite::params_from_iter(values.iter()),
            )?;
        }

        tx.commit()?;
        debug!("Upserted {} transactions", affected);
        Ok(affected)
    }

    /// Get a transaction by its provider transaction id
    pub fn get_user_transaction(&self, transaction_id: &str) -> Result<Option<UserTransaction>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM user_transactions WHERE transaction_id = ?",
            SELECT_COLUMNS
        );

        let result = conn.query_row(&sql, params![transaction_id], Self::map_user_transaction_row);

        match result {
            Ok(tx) => Ok(Some(tx)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Count a user's transactions
    pub fn count_user_transactions(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM user_transactions WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// List a user's transactions, newest first
    pub fn list_user_transactions(&self, user_id: i64, limit: i64) -> Result<Vec<UserTransaction>> {
        let conn = self.conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM user_transactions
            WHERE user_id = ?
            ORDER BY transaction_date DESC, id DESC
            LIMIT ?
            "#,
            SELECT_COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let transactions = stmt
            .query_map(params![user_id, limit], Self::map_user_transaction_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(transactions)
    }

    fn map_user_transaction_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserTransaction> {
        let account_type: String = row.get(3)?;
        let transaction_type: String = row.get(4)?;
        let date_str: String = row.get(10)?;
        let imported_at: String = row.get(17)?;
        let created_at: String = row.get(19)?;
        let updated_at: String = row.get(20)?;

        Ok(UserTransaction {
            id: row.get(0)?,
            user_id: row.get(1)?,
            provider_id: row.get(2)?,
            account_type: account_type.parse().unwrap_or(AccountType::Credit),
            transaction_type: transaction_type.parse().unwrap_or(TransactionType::Purchase),
            transaction_id: row.get(5)?,
            payee: row.get(6)?,
            merchant: row.get(7)?,
            category: row.get(8)?,
            description: row.get(9)?,
            transaction_date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    10,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            amount: row.get(11)?,
            currency: row.get(12)?,
            postcode: row.get(13)?,
            country: row.get(14)?,
            city: row.get(15)?,
            import_id: row.get(16)?,
            imported_at: parse_datetime(&imported_at),
            payload: row.get(18)?,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        })
    }
}
