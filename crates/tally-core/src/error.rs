//! Error types for Tally

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// One or more required columns are absent from the header row
    #[error("Invalid headers: missing required column(s) {}", missing.join(", "))]
    InvalidHeaders { missing: Vec<String> },

    /// A data row's field count does not match the header count
    #[error("Invalid row at line {line}: expected {expected} fields, found {found}")]
    InvalidRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("No default categories configured; add some before importing categorised data")]
    NoDefaultCategories,

    #[error("AI request failed: {0}")]
    AIRequestFailed(String),

    #[error("AI response malformed: {0}")]
    AIResponseMalformed(String),

    /// The AI answered, but not with one normalization per submitted string
    #[error("AI response error: {0}")]
    AIResponse(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
