//! Integration tests for tally-core
//!
//! These tests run the whole import pipeline: CSV stream, Amex formatter,
//! normalization resolver (with a scripted AI backend) and persistence.

use std::io::Write;
use std::path::PathBuf;

use tally_core::{
    ai::MockBackend,
    db::Database,
    error::Error,
    import::{CsvImporter, ImportConfig},
    models::{ImportStatus, NormalizationKind, TransactionType},
    prompts::PromptLibrary,
    AIClient, Provider,
};
use tempfile::TempDir;

const AMEX_HEADER: &str = "Date,Description,Amount,Extended Details,Appears On Your Statement As,Address,Town/City,Postcode,Country,Reference,Category";

const USER: i64 = 42;

struct Harness {
    db: Database,
    mock: MockBackend,
    ai: AIClient,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let db = Database::in_memory().expect("Failed to create test database");
        db.seed_default_categories().unwrap();
        let mock = MockBackend::new();
        let ai = AIClient::Mock(mock.clone());
        Self {
            db,
            mock,
            ai,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn write(&self, name: &str, header: &str, rows: &[String]) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", header).unwrap();
        for row in rows {
            writeln!(file, "{}", row).unwrap();
        }
        path
    }

    fn importer(&self) -> CsvImporter<'_> {
        CsvImporter::new(&self.db, &self.ai, ImportConfig::default())
            .with_prompts(PromptLibrary::embedded_only())
    }

    async fn import(&self, path: &PathBuf) -> tally_core::Result<tally_core::ImportSummary> {
        self.importer().start_import(USER, Provider::Amex, path).await
    }
}

/// Amex row; `category` may be empty
fn amex_row(date: &str, description: &str, amount: &str, reference: &str, category: &str) -> String {
    format!(
        "{date},{description},{amount},,,,London,EC1A 1BB,UNITED KINGDOM,'{reference}',{category}"
    )
}

/// Three-letter suffix so every vendor learns its own pattern
fn vendor(n: usize) -> String {
    let letter = |i: usize| (b'A' + (i % 26) as u8) as char;
    format!("VENDOR {}{}{}", letter(n / 676), letter(n / 26), letter(n))
}

fn vendor_rows(count: usize) -> Vec<String> {
    (0..count)
        .map(|n| amex_row("02/01/2024", &vendor(n), "9.99", &format!("REF{:04}", n), ""))
        .collect()
}

// =============================================================================
// End-to-end scenario
// =============================================================================

#[tokio::test]
async fn test_two_row_import() {
    let h = Harness::new();
    let path = h.write(
        "activity.csv",
        AMEX_HEADER,
        &[
            amex_row(
                "15/01/2024",
                "ACME STORE*ABC123  ONLINE.COM",
                "42.50",
                "TX1",
                "General Purchases-Online Purchases",
            ),
            amex_row(
                "16/01/2024",
                "GROCERY MART 9999 DOWNTOWN",
                "15.75",
                "TX2",
                "Merchandise & Supplies-Groceries",
            ),
        ],
    );

    h.mock
        .push_normalizations(&[("Acme Store", "ACME.*"), ("Grocery Mart", "GROCERY.*")]);
    h.mock.push_normalizations(&[("Shopping", ""), ("Groceries", "")]);

    let summary = h.import(&path).await.unwrap();
    assert_eq!(summary.rows, 2);
    assert_eq!(summary.chunks, 1);
    assert_eq!(summary.merchants.ai, 2);
    assert_eq!(summary.categories.ai, 2);
    assert_eq!(h.mock.call_count(), 2);

    assert_eq!(h.db.count_user_transactions(USER).unwrap(), 2);

    let tx1 = h.db.get_user_transaction("TX1").unwrap().unwrap();
    assert_eq!(tx1.merchant.as_deref(), Some("Acme Store"));
    assert_eq!(tx1.category.as_deref(), Some("Shopping"));
    assert_eq!(tx1.amount, "42.50");
    assert_eq!(tx1.currency, "GBP");
    assert_eq!(tx1.transaction_date.to_string(), "2024-01-15");
    assert_eq!(tx1.import_id, Some(summary.import_id));
    assert_eq!(tx1.transaction_type, TransactionType::Purchase);
    assert!(tx1.payload.unwrap().contains("ACME STORE*ABC123"));

    let tx2 = h.db.get_user_transaction("TX2").unwrap().unwrap();
    assert_eq!(tx2.merchant.as_deref(), Some("Grocery Mart"));
    assert_eq!(tx2.category.as_deref(), Some("Groceries"));
    assert_eq!(tx2.import_id, Some(summary.import_id));

    let import = h.db.get_import(summary.import_id).unwrap().unwrap();
    assert_eq!(import.status, ImportStatus::Completed);
    assert_eq!(import.import_type, "amex");
    assert_eq!(import.user_id, USER);

    // Empty category patterns are stored without one
    let categories = h
        .db
        .list_normalizations(NormalizationKind::Category, 10)
        .unwrap();
    assert!(categories.iter().all(|c| c.regex_pattern.is_none()));
}

// =============================================================================
// Idempotence
// =============================================================================

#[tokio::test]
async fn test_reimport_does_not_duplicate() {
    let h = Harness::new();
    let path = h.write("activity.csv", AMEX_HEADER, &vendor_rows(5));

    h.import(&path).await.unwrap();
    let calls_after_first = h.mock.call_count();
    let second = h.import(&path).await.unwrap();

    assert_eq!(h.db.count_user_transactions(USER).unwrap(), 5);
    assert_eq!(second.merchants.exact, 5);
    assert_eq!(h.mock.call_count(), calls_after_first);

    // Both runs are recorded
    assert_eq!(h.db.list_imports(Some(USER), 10).unwrap().len(), 2);
}

#[tokio::test]
async fn test_reimport_updates_amount() {
    let h = Harness::new();
    let original = h.write(
        "v1.csv",
        AMEX_HEADER,
        &[amex_row("03/02/2024", "COFFEE HOUSE", "3.20", "TXC", "")],
    );
    let first = h.import(&original).await.unwrap();

    h.db
        .conn()
        .unwrap()
        .execute(
            "UPDATE user_transactions SET updated_at = '2000-01-01 00:00:00'",
            [],
        )
        .unwrap();
    let before = h.db.get_user_transaction("TXC").unwrap().unwrap();

    let changed = h.write(
        "v2.csv",
        AMEX_HEADER,
        &[amex_row("03/02/2024", "COFFEE HOUSE", "3.45", "TXC", "")],
    );
    h.import(&changed).await.unwrap();

    let after = h.db.get_user_transaction("TXC").unwrap().unwrap();
    assert_eq!(h.db.count_user_transactions(USER).unwrap(), 1);
    assert_eq!(after.id, before.id);
    assert_eq!(after.amount, "3.45");
    assert!(after.updated_at > before.updated_at);
    // Write-once columns keep the first import's values
    assert_eq!(after.import_id, Some(first.import_id));
}

// =============================================================================
// Chunking
// =============================================================================

#[tokio::test]
async fn test_exact_chunk_is_one_cycle() {
    let h = Harness::new();
    let path = h.write("activity.csv", AMEX_HEADER, &vendor_rows(100));

    let summary = h.import(&path).await.unwrap();
    assert_eq!(summary.chunks, 1);
    assert_eq!(h.mock.call_count(), 1);
    assert_eq!(h.db.count_user_transactions(USER).unwrap(), 100);
}

#[tokio::test]
async fn test_trailing_partial_chunk_flushes() {
    let h = Harness::new();
    let path = h.write("activity.csv", AMEX_HEADER, &vendor_rows(101));

    let summary = h.import(&path).await.unwrap();
    assert_eq!(summary.chunks, 2);
    assert_eq!(h.mock.call_count(), 2);
    assert_eq!(h.db.count_user_transactions(USER).unwrap(), 101);

    // The second call only carries the 101st merchant
    let calls = h.mock.calls();
    assert!(calls[1].user.contains(&format!("1. {}", vendor(100))));
    assert!(!calls[1].user.contains("2. "));
}

#[tokio::test]
async fn test_large_file_is_chunked() {
    let h = Harness::new();
    let path = h.write("activity.csv", AMEX_HEADER, &vendor_rows(250));

    let summary = h.import(&path).await.unwrap();
    assert_eq!(summary.rows, 250);
    assert_eq!(summary.chunks, 3);
    assert_eq!(summary.merchants.ai, 250);
    assert_eq!(h.db.count_user_transactions(USER).unwrap(), 250);
}

#[tokio::test]
async fn test_full_chunk_is_persisted_before_next_row() {
    let h = Harness::new();
    let mut rows = vendor_rows(100);
    rows.push("04/01/2024,TOO FEW FIELDS".to_string());
    let path = h.write("activity.csv", AMEX_HEADER, &rows);

    let importer = h.importer();
    let import_id = importer.begin(USER, Provider::Amex).unwrap();
    let result = importer
        .process_import(import_id, USER, Provider::Amex, &path)
        .await;

    match result {
        Err(Error::InvalidRow {
            expected, found, ..
        }) => {
            assert_eq!(expected, 11);
            assert_eq!(found, 2);
        }
        other => panic!("expected InvalidRow, got {:?}", other),
    }

    assert_eq!(h.db.count_user_transactions(USER).unwrap(), 100);
    let import = h.db.get_import(import_id).unwrap().unwrap();
    assert_eq!(import.status, ImportStatus::Failed);
    assert!(import.completed_at.is_some());
}

#[tokio::test]
async fn test_patterns_learned_in_one_chunk_serve_the_next() {
    let h = Harness::new();
    let mut rows: Vec<String> = (0..100)
        .map(|n| amex_row("05/01/2024", "WIDGET CO*AAA", "1.00", &format!("W{}", n), ""))
        .collect();
    rows.push(amex_row("06/01/2024", "WIDGET CO*ZZZ", "2.00", "W100", ""));
    let path = h.write("activity.csv", AMEX_HEADER, &rows);

    let summary = h.import(&path).await.unwrap();
    assert_eq!(summary.chunks, 2);
    assert_eq!(summary.merchants.ai, 1);
    assert_eq!(summary.merchants.regex, 1);
    assert_eq!(h.mock.call_count(), 1);

    let tx = h.db.get_user_transaction("W100").unwrap().unwrap();
    assert_eq!(tx.merchant.as_deref(), Some("Widget Co"));

    let entries = h.db.list_normalizations(NormalizationKind::Merchant, 10).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].raw, "WIDGET CO*ZZZ");
    assert!(entries[1].regex_pattern.is_none());
}

// =============================================================================
// Header handling
// =============================================================================

#[tokio::test]
async fn test_messy_headers_validate() {
    let h = Harness::new();
    let path = h.write(
        "activity.csv",
        " Date , description ,AMOUNT, Reference ",
        &["05/01/2024,CORNER SHOP,3.50,'R1'".to_string()],
    );

    let summary = h.import(&path).await.unwrap();
    assert_eq!(summary.rows, 1);
    // No category column, so no category resolution
    assert_eq!(summary.categories.total(), 0);

    let tx = h.db.get_user_transaction("R1").unwrap().unwrap();
    assert_eq!(tx.payee, "CORNER SHOP");
    assert!(tx.category.is_none());
}

#[tokio::test]
async fn test_missing_header_fails_before_any_row() {
    let h = Harness::new();
    let path = h.write(
        "activity.csv",
        "Date,Description,Amount",
        &["05/01/2024,CORNER SHOP,3.50".to_string()],
    );

    let result = h.import(&path).await;
    match result {
        Err(Error::InvalidHeaders { missing }) => assert_eq!(missing, vec!["reference"]),
        other => panic!("expected InvalidHeaders, got {:?}", other),
    }

    assert_eq!(h.db.count_user_transactions(USER).unwrap(), 0);
    assert_eq!(h.mock.call_count(), 0);
    let imports = h.db.list_imports(Some(USER), 1).unwrap();
    assert_eq!(imports[0].status, ImportStatus::Failed);
    assert!(imports[0].error.as_deref().unwrap().contains("reference"));
}

// =============================================================================
// Failure propagation
// =============================================================================

#[tokio::test]
async fn test_categories_without_defaults_fail() {
    let h = Harness::new();
    let db = Database::in_memory().unwrap();
    let importer = CsvImporter::new(&db, &h.ai, ImportConfig::default())
        .with_prompts(PromptLibrary::embedded_only());
    let path = h.write(
        "activity.csv",
        AMEX_HEADER,
        &[amex_row("05/01/2024", "CORNER SHOP", "3.50", "R1", "Groceries")],
    );

    let result = importer.start_import(USER, Provider::Amex, &path).await;
    assert!(matches!(result, Err(Error::NoDefaultCategories)));
    assert_eq!(db.count_user_transactions(USER).unwrap(), 0);
    assert_eq!(
        db.list_imports(Some(USER), 1).unwrap()[0].status,
        ImportStatus::Failed
    );
}

#[tokio::test]
async fn test_ai_failure_marks_import_failed() {
    let h = Harness::new();
    h.mock.push_failure("Gemini API request failed (503): overloaded");
    let path = h.write("activity.csv", AMEX_HEADER, &vendor_rows(3));

    let result = h.import(&path).await;
    assert!(matches!(result, Err(Error::AIRequestFailed(_))));
    assert_eq!(h.db.count_user_transactions(USER).unwrap(), 0);

    let import = &h.db.list_imports(Some(USER), 1).unwrap()[0];
    assert_eq!(import.status, ImportStatus::Failed);
    assert!(import.error.as_deref().unwrap().contains("503"));
}

#[tokio::test]
async fn test_finished_import_cannot_transition_again() {
    let h = Harness::new();
    let path = h.write("activity.csv", AMEX_HEADER, &vendor_rows(1));
    let summary = h.import(&path).await.unwrap();

    assert!(matches!(
        h.db.mark_import_failed(summary.import_id, "late failure"),
        Err(Error::InvalidData(_))
    ));
    let import = h.db.get_import(summary.import_id).unwrap().unwrap();
    assert_eq!(import.status, ImportStatus::Completed);
}

#[tokio::test]
async fn test_payment_rows_are_classified() {
    let h = Harness::new();
    let path = h.write(
        "activity.csv",
        AMEX_HEADER,
        &[amex_row(
            "20/01/2024",
            "PAYMENT RECEIVED - THANK YOU",
            "-250.00",
            "PAY1",
            "",
        )],
    );

    h.import(&path).await.unwrap();
    let tx = h.db.get_user_transaction("PAY1").unwrap().unwrap();
    assert_eq!(tx.transaction_type, TransactionType::Payment);
    assert_eq!(tx.amount, "-250.00");
}
