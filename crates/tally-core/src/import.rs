//! Chunked CSV import pipeline
//!
//! One import run streams a provider CSV, formats each row, resolves the
//! chunk's merchants and categories, and upserts the chunk before reading
//! further. Peak memory and the size of any single AI call are bounded by
//! the chunk size, not by the file.
//!
//! The run is tracked by an import record: created as `processing`, then
//! moved to `completed`, or to `failed` with the error text. A failure is
//! always returned to the caller after being recorded.

use std::path::Path;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::ai::AIClient;
use crate::config::DEFAULT_TEMPERATURE;
use crate::csv_stream::{validate_headers, CsvStream, RawRow};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::formatter::{Provider, RowFormatter};
use crate::models::{ImportStatus, NewUserTransaction, NormalizationKind};
use crate::normalize::{NormalizationResolver, Resolution, ResolutionStats};
use crate::prompts::PromptLibrary;

/// Rows per resolve + persist cycle
pub const CHUNK_SIZE: usize = 100;

pub const DEFAULT_CURRENCY: &str = "GBP";

/// Per-invocation import settings
///
/// Fixed once the importer is built; validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportConfig {
    currency: String,
    chunk_size: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            currency: DEFAULT_CURRENCY.to_string(),
            chunk_size: CHUNK_SIZE,
        }
    }
}

impl ImportConfig {
    pub fn new(currency: &str, chunk_size: usize) -> Result<Self> {
        Self::default()
            .with_currency(currency)?
            .with_chunk_size(chunk_size)
    }

    /// ISO currency code, stored uppercase
    pub fn with_currency(self, currency: &str) -> Result<Self> {
        let currency = currency.trim();
        if currency.is_empty() || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::Config(format!("Invalid currency code: {:?}", currency)));
        }
        Ok(Self {
            currency: currency.to_ascii_uppercase(),
            ..self
        })
    }

    pub fn with_chunk_size(self, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("import.chunk_size must be at least 1".into()));
        }
        Ok(Self { chunk_size, ..self })
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Outcome of a completed import
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub import_id: i64,
    /// Data rows read and persisted
    pub rows: usize,
    /// Resolve + persist cycles run
    pub chunks: usize,
    pub merchants: ResolutionStats,
    pub categories: ResolutionStats,
}

/// Runs provider CSV imports against a database and AI client
pub struct CsvImporter<'a> {
    db: &'a Database,
    ai: &'a AIClient,
    config: ImportConfig,
    temperature: f32,
    prompts: PromptLibrary,
}

impl<'a> CsvImporter<'a> {
    pub fn new(db: &'a Database, ai: &'a AIClient, config: ImportConfig) -> Self {
        Self {
            db,
            ai,
            config,
            temperature: DEFAULT_TEMPERATURE,
            prompts: PromptLibrary::new(),
        }
    }

    /// Sampling temperature for normalization calls
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Create the import record for a run (status `processing`)
    pub fn begin(&self, user_id: i64, provider: Provider) -> Result<i64> {
        let import_id = self.db.create_import(user_id, provider.as_str())?;
        info!(import_id, user_id, provider = %provider, "Import started");
        Ok(import_id)
    }

    /// Create an import record and run the pipeline inline
    pub async fn start_import(
        &self,
        user_id: i64,
        provider: Provider,
        path: &Path,
    ) -> Result<ImportSummary> {
        let import_id = self.begin(user_id, provider)?;
        self.process_import(import_id, user_id, provider, path).await
    }

    /// Run the pipeline for an existing import record
    ///
    /// Marks the record `completed` on success. On any error the record is
    /// marked `failed` and the original error is returned.
    pub async fn process_import(
        &self,
        import_id: i64,
        user_id: i64,
        provider: Provider,
        path: &Path,
    ) -> Result<ImportSummary> {
        match self.run(import_id, user_id, provider, path).await {
            Ok(summary) => {
                info!(
                    import_id,
                    rows = summary.rows,
                    chunks = summary.chunks,
                    "Import completed"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(import_id, error = %e, "Import failed");
                if let Err(mark_err) = self.db.mark_import_failed(import_id, &e.to_string()) {
                    warn!(import_id, error = %mark_err, "Could not record import failure");
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        import_id: i64,
        user_id: i64,
        provider: Provider,
        path: &Path,
    ) -> Result<ImportSummary> {
        let import = self
            .db
            .get_import(import_id)?
            .ok_or_else(|| Error::NotFound(format!("Import {}", import_id)))?;
        if import.status != ImportStatus::Processing {
            return Err(Error::InvalidData(format!(
                "Import {} is already {}",
                import_id, import.status
            )));
        }

        let provider_id = self.db.provider_id(provider.code())?;

        let mut stream = CsvStream::open(path)?;
        let headers = stream.read_header()?;
        validate_headers(provider.required_headers(), &headers)?;

        let resolver = NormalizationResolver::with_prompts(
            self.db,
            self.ai,
            self.temperature,
            self.prompts.clone(),
        );
        let batch = Batch {
            import_id,
            user_id,
            provider,
            provider_id,
        };

        let mut summary = ImportSummary {
            import_id,
            ..Default::default()
        };
        let chunk_size = self.config.chunk_size();
        let mut chunk: Vec<RawRow> = Vec::with_capacity(chunk_size);

        while let Some(row) = stream.read_row()? {
            chunk.push(row);
            if chunk.len() >= chunk_size {
                self.flush(&resolver, &batch, &chunk, &mut summary).await?;
                chunk.clear();
            }
        }

        if !chunk.is_empty() {
            self.flush(&resolver, &batch, &chunk, &mut summary).await?;
        }

        self.db.mark_import_completed(import_id)?;
        Ok(summary)
    }

    /// Format, resolve and persist one chunk
    async fn flush(
        &self,
        resolver: &NormalizationResolver<'_>,
        batch: &Batch,
        rows: &[RawRow],
        summary: &mut ImportSummary,
    ) -> Result<()> {
        let provider = batch.provider;
        let mut formatted = Vec::with_capacity(rows.len());
        let mut payees = Vec::new();
        let mut categories = Vec::new();

        for row in rows {
            let tx = provider.format_row(row)?;
            let transaction_id = provider.row_transaction_id(row)?;
            let category = if provider.has_category() {
                provider.extract_category(row)
            } else {
                None
            };

            payees.push(tx.payee.clone());
            if let Some(c) = &category {
                categories.push(c.clone());
            }
            formatted.push((row, tx, transaction_id, category));
        }

        let merchants = resolver.resolve(NormalizationKind::Merchant, &payees).await?;
        let category_labels = if categories.is_empty() {
            Resolution::default()
        } else {
            resolver
                .resolve(NormalizationKind::Category, &categories)
                .await?
        };

        let transactions: Vec<NewUserTransaction> = formatted
            .into_iter()
            .map(|(row, tx, transaction_id, category)| {
                let merchant = Some(merchants.get(&tx.payee).unwrap_or(tx.payee.as_str()))
                    .filter(|m| !m.trim().is_empty())
                    .map(String::from);
                let category = category.map(|c| category_labels.get(&c).unwrap_or(c.as_str()).to_string());
                NewUserTransaction {
                    user_id: batch.user_id,
                    provider_id: batch.provider_id,
                    account_type: tx.account_type,
                    transaction_type: tx.transaction_type,
                    transaction_id,
                    merchant,
                    category,
                    description: tx.description,
                    transaction_date: tx.transaction_date,
                    amount: tx.amount,
                    currency: self.config.currency().to_string(),
                    postcode: tx.postcode,
                    country: tx.country,
                    city: tx.city,
                    import_id: batch.import_id,
                    payload: row.to_json().to_string(),
                    payee: tx.payee,
                }
            })
            .collect();

        self.db.upsert_transactions(&transactions)?;

        summary.rows += transactions.len();
        summary.chunks += 1;
        summary.merchants.add(&merchants.stats);
        summary.categories.add(&category_labels.stats);

        info!(
            import_id = batch.import_id,
            chunk = summary.chunks,
            rows = transactions.len(),
            "Flushed chunk"
        );
        Ok(())
    }
}

/// Identity shared by every chunk of one run
struct Batch {
    import_id: i64,
    user_id: i64,
    provider: Provider,
    provider_id: i64,
}
