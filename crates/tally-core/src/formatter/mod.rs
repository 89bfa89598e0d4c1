//! Provider row formatters
//!
//! Each supported provider maps its CSV columns onto a
//! [`FormattedTransaction`]. [`Provider`] is the closed set of providers and
//! dispatches to the concrete formatter.

use crate::csv_stream::RawRow;
use crate::error::{Error, Result};
use crate::models::FormattedTransaction;

mod amex;

pub use amex::AmexFormatter;

/// Maps one provider's CSV rows onto canonical transactions
pub trait RowFormatter {
    /// Provider code stored on imports and in the `providers` table
    fn code(&self) -> &'static str;

    /// Columns that must be present in the header row
    fn required_headers(&self) -> &'static [&'static str];

    fn format_row(&self, row: &RawRow) -> Result<FormattedTransaction>;

    /// Stable per-row identifier used as the upsert key
    fn row_transaction_id(&self, row: &RawRow) -> Result<String>;

    /// Whether this provider exports a category column
    fn has_category(&self) -> bool {
        false
    }

    fn extract_category(&self, _row: &RawRow) -> Option<String> {
        None
    }
}

/// Supported CSV providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Amex,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amex => "amex",
        }
    }

    /// Human-readable provider name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Amex => "American Express",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "amex" | "american express" | "american_express" => Ok(Self::Amex),
            _ => Err(Error::UnsupportedProvider(s.to_string())),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl RowFormatter for Provider {
    fn code(&self) -> &'static str {
        self.as_str()
    }

    fn required_headers(&self) -> &'static [&'static str] {
        match self {
            Self::Amex => AmexFormatter.required_headers(),
        }
    }

    fn format_row(&self, row: &RawRow) -> Result<FormattedTransaction> {
        match self {
            Self::Amex => AmexFormatter.format_row(row),
        }
    }

    fn row_transaction_id(&self, row: &RawRow) -> Result<String> {
        match self {
            Self::Amex => AmexFormatter.row_transaction_id(row),
        }
    }

    fn has_category(&self) -> bool {
        match self {
            Self::Amex => AmexFormatter.has_category(),
        }
    }

    fn extract_category(&self, row: &RawRow) -> Option<String> {
        match self {
            Self::Amex => AmexFormatter.extract_category(row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!("amex".parse::<Provider>().unwrap(), Provider::Amex);
        assert_eq!("AMEX".parse::<Provider>().unwrap(), Provider::Amex);
        assert!(matches!(
            "monzo".parse::<Provider>(),
            Err(Error::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn test_provider_delegates() {
        let provider = Provider::Amex;
        assert_eq!(provider.code(), "amex");
        assert!(provider.has_category());
        assert_eq!(provider.required_headers().len(), 4);
        assert_eq!(provider.to_string(), "amex");
        assert_eq!(provider.display_name(), "American Express");
    }
}
