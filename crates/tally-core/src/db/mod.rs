//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `transactions` - Bulk transaction upsert and reads
//! - `normalizations` - Merchant/category normalization cache
//! - `categories` - Allowed default category labels
//! - `imports` - Import lifecycle records
//! - `providers` - Provider lookup

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::info;

use crate::error::{Error, Result};

mod categories;
mod imports;
mod normalizations;
mod providers;
mod transactions;

pub use categories::DEFAULT_CATEGORIES;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "TALLY_DB_KEY";

/// How long a connection waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Fixed application salt - changing this would invalidate all existing encrypted databases
    const APP_SALT: &[u8; 16] = b"tally-salt-v1-fx";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Current time in the format SQLite's CURRENT_TIMESTAMP uses
pub(crate) fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    db_path: String,
    // Declared after the pool so connections close before the directory goes
    scratch_dir: Option<Arc<TempDir>>,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `TALLY_DB_KEY` to be set. The database is encrypted using
    /// SQLCipher with a key derived from the passphrase via Argon2.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: Only use for development or testing.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = match passphrase {
            Some(pass) => Some(format!("PRAGMA key = 'x\"{}\"';", derive_key(pass)?)),
            None => None,
        };

        // Runs on every new pooled connection. The key must be set before
        // anything else touches the file.
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if let Some(pragma) = &key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
            scratch_dir: None,
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a file in a private temp directory rather than `:memory:` so
    /// every pooled connection sees the same data. The directory is removed
    /// when the last clone of the database is dropped.
    pub fn in_memory() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("tally_test_").tempdir()?;
        let path = dir.path().join("tally.db");

        let mut db = Self::new_unencrypted(&path.to_string_lossy())?;
        db.scratch_dir = Some(Arc::new(dir));
        Ok(db)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block writers, concurrent imports can overlap
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Providers (institutions whose exports we can read)
            CREATE TABLE IF NOT EXISTS providers (
                id INTEGER PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                type TEXT NOT NULL,                      -- credit_card, bank, investment
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            INSERT OR IGNORE INTO providers (code, name, type) VALUES
                ('amex', 'American Express', 'credit_card'),
                ('monzo', 'Monzo', 'bank'),
                ('trading212', 'Trading 212', 'investment');

            -- Imports (one row per pipeline run)
            CREATE TABLE IF NOT EXISTS imports (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                type TEXT NOT NULL,                      -- provider code
                status TEXT NOT NULL DEFAULT 'processing', -- processing, completed, failed
                error TEXT,
                started_at DATETIME NOT NULL,
                completed_at DATETIME,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_imports_user ON imports(user_id);
            CREATE INDEX IF NOT EXISTS idx_imports_status ON imports(status);

            -- User transactions
            -- transaction_id is the provider's own reference and the upsert key
            CREATE TABLE IF NOT EXISTS user_transactions (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                provider_id INTEGER NOT NULL REFERENCES providers(id),
                account_type TEXT NOT NULL,              -- credit, debit, investment, cash
                transaction_type TEXT NOT NULL,          -- purchase, payment
                transaction_id TEXT NOT NULL UNIQUE,
                payee TEXT NOT NULL,
                merchant TEXT,
                category TEXT,
                description TEXT,
                transaction_date DATE NOT NULL,
                amount TEXT NOT NULL,                    -- two-decimal string
                currency TEXT NOT NULL,
                postcode TEXT,
                country TEXT,
                city TEXT,
                import_id INTEGER REFERENCES imports(id),
                imported_at DATETIME NOT NULL,
                payload TEXT,                            -- JSON of the original CSV row
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_user_transactions_user ON user_transactions(user_id);
            CREATE INDEX IF NOT EXISTS idx_user_transactions_date ON user_transactions(transaction_date);
            CREATE INDEX IF NOT EXISTS idx_user_transactions_import ON user_transactions(import_id);

            -- Normalization caches
            -- regex_pattern is unique when present; several raw strings may
            -- share a label while only one of them owns the pattern
            CREATE TABLE IF NOT EXISTS merchant_normalizations (
                id INTEGER PRIMARY KEY,
                raw_merchant TEXT NOT NULL UNIQUE,
                normalized_merchant TEXT NOT NULL,
                regex_pattern TEXT UNIQUE,
                detection_method TEXT NOT NULL DEFAULT 'ai', -- exact-seed, regex, ai
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS category_normalizations (
                id INTEGER PRIMARY KEY,
                raw_category TEXT NOT NULL UNIQUE,
                normalized_category TEXT NOT NULL,
                regex_pattern TEXT UNIQUE,
                detection_method TEXT NOT NULL DEFAULT 'ai',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            -- Allowed category labels offered to the AI
            CREATE TABLE IF NOT EXISTS default_categories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}
