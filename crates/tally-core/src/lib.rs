//! Tally Core Library
//!
//! Shared functionality for the Tally transaction importer:
//! - Streaming CSV reader with header normalization
//! - Provider row formatters (American Express)
//! - Three-tier merchant/category normalization (exact, regex, AI)
//! - Pluggable AI backends (Gemini, OpenAI-compatible)
//! - Prompt library for customizable AI prompts
//! - Database access, migrations and the import lifecycle

pub mod ai;
pub mod config;
pub mod csv_stream;
pub mod db;
pub mod error;
pub mod formatter;
pub mod import;
pub mod models;
pub mod normalize;
pub mod prompts;

/// Test utilities including mock Gemini server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIBackend, AIClient, GeminiBackend, MockBackend, OpenAICompatibleBackend};
pub use config::{AiSettings, Config};
pub use csv_stream::{CsvStream, RawRow};
pub use db::Database;
pub use error::{Error, Result};
pub use formatter::{AmexFormatter, Provider, RowFormatter};
pub use import::{CsvImporter, ImportConfig, ImportSummary, CHUNK_SIZE};
pub use models::{
    AccountType, DetectionMethod, FormattedTransaction, Import, ImportStatus, NewUserTransaction,
    NormalizationEntry, NormalizationKind, TransactionType, UserTransaction,
};
pub use normalize::{NormalizationResolver, Resolution, ResolutionStats};
pub use prompts::{Prompt, PromptId, PromptLibrary};
