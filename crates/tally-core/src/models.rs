//! Domain models for Tally

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Kind of account a provider's transactions belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Credit,
    Debit,
    Investment,
    Cash,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
            Self::Investment => "investment",
            Self::Cash => "cash",
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "credit" => Ok(Self::Credit),
            "debit" => Ok(Self::Debit),
            "investment" => Ok(Self::Investment),
            "cash" => Ok(Self::Cash),
            _ => Err(format!("Unknown account type: {}", s)),
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Purchase or payment, decided from the row text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Purchase,
    Payment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Payment => "payment",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "purchase" => Ok(Self::Purchase),
            "payment" => Ok(Self::Payment),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Import record status
///
/// `Processing` is the only non-terminal state; a record moves out of it once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    #[default]
    Processing,
    Completed,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl std::str::FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown import status: {}", s)),
        }
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An import record tracking one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Import {
    pub id: i64,
    pub user_id: i64,
    /// Provider code, e.g. `amex`
    pub import_type: String,
    pub status: ImportStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which normalization cache a lookup targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationKind {
    Merchant,
    Category,
}

impl NormalizationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merchant => "merchant",
            Self::Category => "category",
        }
    }

    pub(crate) fn table(&self) -> &'static str {
        match self {
            Self::Merchant => "merchant_normalizations",
            Self::Category => "category_normalizations",
        }
    }

    pub(crate) fn raw_column(&self) -> &'static str {
        match self {
            Self::Merchant => "raw_merchant",
            Self::Category => "raw_category",
        }
    }

    pub(crate) fn normalized_column(&self) -> &'static str {
        match self {
            Self::Merchant => "normalized_merchant",
            Self::Category => "normalized_category",
        }
    }
}

impl std::str::FromStr for NormalizationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "merchant" | "merchants" => Ok(Self::Merchant),
            "category" | "categories" => Ok(Self::Category),
            _ => Err(format!("Unknown normalization kind: {}", s)),
        }
    }
}

impl std::fmt::Display for NormalizationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provenance of a normalization cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DetectionMethod {
    /// Hand-seeded exact mapping
    #[serde(rename = "exact-seed")]
    ExactSeed,
    #[serde(rename = "regex")]
    Regex,
    #[default]
    #[serde(rename = "ai")]
    Ai,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactSeed => "exact-seed",
            Self::Regex => "regex",
            Self::Ai => "ai",
        }
    }
}

impl std::str::FromStr for DetectionMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact-seed" | "exact" | "seed" => Ok(Self::ExactSeed),
            "regex" => Ok(Self::Regex),
            "ai" => Ok(Self::Ai),
            _ => Err(format!("Unknown detection method: {}", s)),
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A row of a normalization cache table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationEntry {
    pub id: i64,
    pub raw: String,
    pub normalized: String,
    pub regex_pattern: Option<String>,
    pub detection_method: DetectionMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A learned mapping waiting to be written to a cache table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNormalization {
    pub raw: String,
    pub normalized: String,
    pub regex_pattern: Option<String>,
}

/// Canonical transaction fields produced by a provider formatter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedTransaction {
    pub transaction_date: NaiveDate,
    pub payee: String,
    /// Decimal text with two places, e.g. `-42.50`
    pub amount: String,
    pub description: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
    pub account_type: AccountType,
    pub transaction_type: TransactionType,
}

/// A transaction ready for the bulk upsert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUserTransaction {
    pub user_id: i64,
    pub provider_id: i64,
    pub account_type: AccountType,
    pub transaction_type: TransactionType,
    pub transaction_id: String,
    pub payee: String,
    pub merchant: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub transaction_date: NaiveDate,
    pub amount: String,
    pub currency: String,
    pub postcode: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub import_id: i64,
    /// Verbatim CSV row as JSON
    pub payload: String,
}

/// A persisted transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTransaction {
    pub id: i64,
    pub user_id: i64,
    pub provider_id: i64,
    pub account_type: AccountType,
    pub transaction_type: TransactionType,
    pub transaction_id: String,
    pub payee: String,
    pub merchant: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub transaction_date: NaiveDate,
    pub amount: String,
    pub currency: String,
    pub postcode: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub import_id: Option<i64>,
    pub imported_at: DateTime<Utc>,
    pub payload: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_status_roundtrip() {
        for status in [
            ImportStatus::Processing,
            ImportStatus::Completed,
            ImportStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ImportStatus>().unwrap(), status);
        }
        assert!("pending".parse::<ImportStatus>().is_err());
    }

    #[test]
    fn test_import_status_terminal() {
        assert!(!ImportStatus::Processing.is_terminal());
        assert!(ImportStatus::Completed.is_terminal());
        assert!(ImportStatus::Failed.is_terminal());
    }

    #[test]
    fn test_normalization_kind_columns() {
        assert_eq!(NormalizationKind::Merchant.table(), "merchant_normalizations");
        assert_eq!(NormalizationKind::Category.raw_column(), "raw_category");
        assert_eq!(
            NormalizationKind::Category.normalized_column(),
            "normalized_category"
        );
        assert_eq!(
            "Merchants".parse::<NormalizationKind>().unwrap(),
            NormalizationKind::Merchant
        );
    }

    #[test]
    fn test_detection_method_parse() {
        assert_eq!("ai".parse::<DetectionMethod>().unwrap(), DetectionMethod::Ai);
        assert_eq!(
            "exact-seed".parse::<DetectionMethod>().unwrap(),
            DetectionMethod::ExactSeed
        );
        assert_eq!(DetectionMethod::Regex.to_string(), "regex");
    }
}
