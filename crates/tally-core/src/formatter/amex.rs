//! American Express CSV format
//!
//! Format: Date,Description,Amount,Extended Details,Appears On Your Statement As,
//! Address,Town/City,Postcode,Country,Reference,Category
//!
//! Only Date, Description, Amount and Reference are required. Dates are
//! DD/MM/YYYY; references arrive wrapped in apostrophes (`'AT253...'`).

use chrono::NaiveDate;
use regex::{RegexSet, RegexSetBuilder};
use rust_decimal::Decimal;
use std::sync::OnceLock;

use super::RowFormatter;
use crate::csv_stream::RawRow;
use crate::error::{Error, Result};
use crate::models::{AccountType, FormattedTransaction, TransactionType};

const REQUIRED_HEADERS: &[&str] = &["Date", "Description", "Amount", "Reference"];

const PAYMENT_INDICATORS: &[&str] = &[
    r"payment.*thank\s+you",
    r"direct\s+debit",
    r"payment\s+received",
    r"autopay",
    r"automatic\s+payment",
];

fn payment_indicators() -> Result<&'static RegexSet> {
    static SET: OnceLock<std::result::Result<RegexSet, regex::Error>> = OnceLock::new();
    SET.get_or_init(|| {
        RegexSetBuilder::new(PAYMENT_INDICATORS)
            .case_insensitive(true)
            .build()
    })
    .as_ref()
    .map_err(|e| Error::Regex(e.clone()))
}

/// Formatter for American Express credit card exports
#[derive(Debug, Clone, Copy, Default)]
pub struct AmexFormatter;

impl AmexFormatter {
    fn required(row: &RawRow, name: &str) -> Result<String> {
        row.get(name).map(|s| s.to_string()).ok_or_else(|| {
            Error::InvalidData(format!("Line {}: missing {} column", row.line(), name))
        })
    }

    fn classify(payee: &str, description: Option<&str>) -> Result<TransactionType> {
        let set = payment_indicators()?;
        let is_payment =
            set.is_match(payee) || description.map(|d| set.is_match(d)).unwrap_or(false);

        Ok(if is_payment {
            TransactionType::Payment
        } else {
            TransactionType::Purchase
        })
    }
}

/// Parse `DD/MM/YYYY`, accepting dates that are already ISO
pub(crate) fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map_err(|_| Error::InvalidData(format!("Unable to parse date: {}", s)))
}

/// Normalize a decimal amount to two places, keeping the sign
///
/// Amounts with significant digits past the pennies are rejected rather
/// than rounded.
pub(crate) fn parse_amount(s: &str) -> Result<String> {
    let cleaned: String = s.trim().replace([',', ' ', '£', '$'], "");

    let mut value = Decimal::from_str_exact(&cleaned)
        .map_err(|_| Error::InvalidData(format!("Unable to parse amount: {}", s)))?
        .normalize();

    if value.scale() > 2 {
        return Err(Error::InvalidData(format!(
            "Amount has more than two decimal places: {}",
            s
        )));
    }
    if value.is_zero() {
        value = Decimal::ZERO;
    }
    value.rescale(2);

    Ok(value.to_string())
}

impl RowFormatter for AmexFormatter {
    fn code(&self) -> &'static str {
        "amex"
    }

    fn required_headers(&self) -> &'static [&'static str] {
        REQUIRED_HEADERS
    }

    fn format_row(&self, row: &RawRow) -> Result<FormattedTransaction> {
        let transaction_date = parse_date(&Self::required(row, "date")?)?;
        let amount = parse_amount(&Self::required(row, "amount")?)?;

        // Statement name is the cleaner merchant string when present
        let payee = match row.get_non_empty("appears on your statement as") {
            Some(statement_as) => statement_as.to_string(),
            None => Self::required(row, "description")?,
        };
        let description = row.get_non_empty("extended details").map(String::from);

        let transaction_type = Self::classify(&payee, description.as_deref())?;

        Ok(FormattedTransaction {
            transaction_date,
            payee,
            amount,
            description,
            city: row.get_non_empty("town/city").map(String::from),
            postcode: row.get_non_empty("postcode").map(String::from),
            country: row.get_non_empty("country").map(String::from),
            account_type: AccountType::Credit,
            transaction_type,
        })
    }

    fn row_transaction_id(&self, row: &RawRow) -> Result<String> {
        let reference = Self::required(row, "reference")?;
        let id: String = reference
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '\'' && *c != '"')
            .collect();

        if id.is_empty() {
            return Err(Error::InvalidData(format!(
                "Line {}: empty reference",
                row.line()
            )));
        }
        Ok(id)
    }

    fn has_category(&self) -> bool {
        true
    }

    fn extract_category(&self, row: &RawRow) -> Option<String> {
        row.get_non_empty("category").map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADERS: &[&str] = &[
        "date",
        "description",
        "amount",
        "extended details",
        "appears on your statement as",
        "town/city",
        "postcode",
        "country",
        "reference",
        "category",
    ];

    fn row(values: &[&str]) -> RawRow {
        let headers: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
        RawRow::new(2, &headers, values)
    }

    fn purchase_row() -> RawRow {
        row(&[
            "02/11/2025",
            "ACME STORE*ABC123  ONLINE.COM",
            "42.50",
            "ACME STORE ONLINE ORDER 123",
            "ACME STORE",
            "LONDON",
            "EC1A 1BB",
            "UNITED KINGDOM",
            "'TX001234567890001'",
            "General Purchases-Online Purchases",
        ])
    }

    #[test]
    fn test_format_purchase() {
        let tx = AmexFormatter.format_row(&purchase_row()).unwrap();
        assert_eq!(tx.transaction_date.to_string(), "2025-11-02");
        assert_eq!(tx.payee, "ACME STORE");
        assert_eq!(tx.amount, "42.50");
        assert_eq!(tx.description.as_deref(), Some("ACME STORE ONLINE ORDER 123"));
        assert_eq!(tx.city.as_deref(), Some("LONDON"));
        assert_eq!(tx.postcode.as_deref(), Some("EC1A 1BB"));
        assert_eq!(tx.country.as_deref(), Some("UNITED KINGDOM"));
        assert_eq!(tx.account_type, AccountType::Credit);
        assert_eq!(tx.transaction_type, TransactionType::Purchase);
    }

    #[test]
    fn test_payee_falls_back_to_description() {
        let r = row(&[
            "15/01/2025",
            "GROCERY MART 9999 DOWNTOWN",
            "15.75",
            "",
            "",
            "",
            "",
            "",
            "'TX2'",
            "",
        ]);
        let tx = AmexFormatter.format_row(&r).unwrap();
        assert_eq!(tx.payee, "GROCERY MART 9999 DOWNTOWN");
        assert!(tx.description.is_none());
        assert!(tx.city.is_none());
        assert!(tx.postcode.is_none());
        assert!(tx.country.is_none());
        assert!(AmexFormatter.extract_category(&r).is_none());
    }

    #[test]
    fn test_minimal_headers() {
        let headers: Vec<String> = ["date", "description", "amount", "reference"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let r = RawRow::new(2, &headers, &["01/02/2025", "COFFEE SHOP", "3.2", "REF 1"]);

        let tx = AmexFormatter.format_row(&r).unwrap();
        assert_eq!(tx.payee, "COFFEE SHOP");
        assert_eq!(tx.amount, "3.20");
        assert_eq!(AmexFormatter.row_transaction_id(&r).unwrap(), "REF1");
    }

    #[test]
    fn test_transaction_id_strips_quotes() {
        assert_eq!(
            AmexFormatter.row_transaction_id(&purchase_row()).unwrap(),
            "TX001234567890001"
        );

        let mut values = vec!["02/11/2025", "X", "1.00", "", "", "", "", "", "", ""];
        values[8] = " \"TX 99\" ";
        assert_eq!(AmexFormatter.row_transaction_id(&row(&values)).unwrap(), "TX99");

        values[8] = "''";
        assert!(matches!(
            AmexFormatter.row_transaction_id(&row(&values)),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_payment_detection() {
        let payments = [
            "PAYMENT THANK YOU - DIRECT DEBIT",
            "DIRECT DEBIT PAYMENT",
            "PAYMENT RECEIVED",
            "AUTOPAY SCHEDULED",
            "Payment - Thank You",
        ];
        for text in payments {
            assert_eq!(
                AmexFormatter::classify(text, None).unwrap(),
                TransactionType::Payment,
                "{} should be a payment",
                text
            );
        }

        let purchases = [
            "ACME STORE*ABC123  ONLINE.COM",
            "GROCERY MART 9999 DOWNTOWN",
            "AMAZON MARKETPLACE",
        ];
        for text in purchases {
            assert_eq!(
                AmexFormatter::classify(text, None).unwrap(),
                TransactionType::Purchase,
                "{} should be a purchase",
                text
            );
        }
    }

    #[test]
    fn test_payment_detected_from_statement_as() {
        let r = row(&[
            "05/11/2025",
            "AMEX",
            "-500.00",
            "",
            "AUTOMATIC PAYMENT",
            "",
            "",
            "",
            "'TX3'",
            "",
        ]);
        let tx = AmexFormatter.format_row(&r).unwrap();
        assert_eq!(tx.transaction_type, TransactionType::Payment);
        assert_eq!(tx.amount, "-500.00");
    }

    #[test]
    fn test_payment_detected_from_description() {
        assert_eq!(
            AmexFormatter::classify("AMEX", Some("Direct Debit received")).unwrap(),
            TransactionType::Payment
        );
    }

    #[test]
    fn test_extract_category() {
        assert!(AmexFormatter.has_category());
        assert_eq!(
            AmexFormatter.extract_category(&purchase_row()).as_deref(),
            Some("General Purchases-Online Purchases")
        );
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("02/11/2025").unwrap().to_string(), "2025-11-02");
        assert_eq!(parse_date("2025-11-02").unwrap().to_string(), "2025-11-02");
        assert!(parse_date("11/31/2025").is_err());
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("42.5").unwrap(), "42.50");
        assert_eq!(parse_amount("1,234.00").unwrap(), "1234.00");
        assert_eq!(parse_amount("£7").unwrap(), "7.00");
        assert_eq!(parse_amount("-3.100").unwrap(), "-3.10");
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("").is_err());
    }

    #[test]
    fn test_parse_amount_keeps_every_digit() {
        assert_eq!(
            parse_amount("12345678901234567.89").unwrap(),
            "12345678901234567.89"
        );
        assert_eq!(parse_amount("-0.00").unwrap(), "0.00");

        for input in ["1.005", "-0.001", "-15.754"] {
            assert!(
                matches!(parse_amount(input), Err(Error::InvalidData(_))),
                "{} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_bad_date_is_invalid_data() {
        let mut values = vec!["31/02/2025", "X", "1.00", "", "", "", "", "", "'T'", ""];
        assert!(matches!(
            AmexFormatter.format_row(&row(&values)),
            Err(Error::InvalidData(_))
        ));
        values[0] = "01/02/2025";
        assert!(AmexFormatter.format_row(&row(&values)).is_ok());
    }
}
