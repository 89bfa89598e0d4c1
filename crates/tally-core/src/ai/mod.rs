//! Pluggable AI backend abstraction
//!
//! The normalization resolver only needs one operation from a model: a chat
//! call that takes a system prompt, a user prompt and an optional JSON schema
//! for structured output, and returns the raw text of the answer.
//!
//! # Architecture
//!
//! - `AIBackend` trait: defines the interface for all AI operations
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `GeminiBackend`, `OpenAICompatibleBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (gemini, openai_compatible, mock). Default: gemini
//! - `GEMINI_API_KEY`: API key (required for gemini backend)
//! - `GEMINI_MODEL`: Model name (default: gemini-2.0-flash-exp)
//! - `GEMINI_HOST`: API base URL (default: https://generativelanguage.googleapis.com)
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required for openai_compatible backend)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: gpt-4o-mini)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

mod gemini;
pub(crate) mod mock;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use gemini::GeminiBackend;
pub use mock::{MockBackend, MockCall};
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Default HTTP timeout for model calls, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Trait defining the interface for all AI backends
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Send one chat exchange and return the model's text answer
    ///
    /// When `schema` is given the backend asks for JSON output matching it.
    /// Non-success transport status is `AIRequestFailed`; a reply without
    /// the expected text is `AIResponseMalformed`.
    async fn chat(
        &self,
        system: &str,
        user: &str,
        schema: Option<&Value>,
        temperature: f32,
    ) -> Result<String>;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum AIClient {
    /// Google Gemini generateContent API
    Gemini(GeminiBackend),
    /// OpenAI-compatible backend (OpenAI, vLLM, LocalAI, llama-server, etc.)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use:
    /// - `gemini` (default): Uses GEMINI_API_KEY, GEMINI_MODEL and GEMINI_HOST
    /// - `openai_compatible`: Uses OPENAI_COMPATIBLE_HOST and OPENAI_COMPATIBLE_MODEL
    /// - `mock`: Creates a mock backend for testing
    ///
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "gemini".to_string());

        match backend.to_lowercase().as_str() {
            "gemini" | "google" => GeminiBackend::from_env().map(AIClient::Gemini),
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to gemini");
                GeminiBackend::from_env().map(AIClient::Gemini)
            }
        }
    }

    /// Create a Gemini backend directly
    pub fn gemini(api_key: &str, model: &str) -> Self {
        AIClient::Gemini(GeminiBackend::new(api_key, model))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            AIClient::Gemini(b) => AIClient::Gemini(b.with_model(model)),
            AIClient::OpenAICompatible(b) => AIClient::OpenAICompatible(b.with_model(model)),
            AIClient::Mock(b) => AIClient::Mock(b.with_model(model)),
        }
    }

    /// Backend name for display
    pub fn backend_name(&self) -> &'static str {
        match self {
            AIClient::Gemini(_) => "gemini",
            AIClient::OpenAICompatible(_) => "openai_compatible",
            AIClient::Mock(_) => "mock",
        }
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend
#[async_trait]
impl AIBackend for AIClient {
    async fn chat(
        &self,
        system: &str,
        user: &str,
        schema: Option<&Value>,
        temperature: f32,
    ) -> Result<String> {
        match self {
            AIClient::Gemini(b) => b.chat(system, user, schema, temperature).await,
            AIClient::OpenAICompatible(b) => b.chat(system, user, schema, temperature).await,
            AIClient::Mock(b) => b.chat(system, user, schema, temperature).await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::Gemini(b) => b.model(),
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::Gemini(b) => b.host(),
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}
