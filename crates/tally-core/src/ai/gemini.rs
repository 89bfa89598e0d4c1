//! Google Gemini backend
//!
//! Talks to the `generateContent` endpoint. The system and user prompts are
//! sent as a single user turn; structured output is requested through
//! `responseMimeType` and `responseJsonSchema` when a schema is supplied.
//!
//! # Configuration
//!
//! Environment variables:
//! - `GEMINI_API_KEY`: API key (required)
//! - `GEMINI_MODEL`: Model name (default: gemini-2.0-flash-exp)
//! - `GEMINI_HOST`: API base URL (default: https://generativelanguage.googleapis.com)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

use super::{AIBackend, DEFAULT_TIMEOUT_SECS};

pub const DEFAULT_GEMINI_HOST: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";

const MAX_OUTPUT_TOKENS: u32 = 2048;

/// Gemini backend
#[derive(Clone)]
pub struct GeminiBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiBackend {
    /// Create a new Gemini backend against the public API
    pub fn new(api_key: &str, model: &str) -> Self {
        Self::with_host(DEFAULT_GEMINI_HOST, api_key, model)
    }

    /// Create a backend against a custom host (proxies, test servers)
    pub fn with_host(base_url: &str, api_key: &str, model: &str) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    /// Create from environment variables
    ///
    /// Required: `GEMINI_API_KEY`
    /// Optional: `GEMINI_MODEL`, `GEMINI_HOST`
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())?;
        let model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());
        let host = std::env::var("GEMINI_HOST").unwrap_or_else(|_| DEFAULT_GEMINI_HOST.to_string());

        Some(Self::with_host(&host, &api_key, &model))
    }

    fn build_request(
        system: &str,
        user: &str,
        schema: Option<&Value>,
        temperature: f32,
    ) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(format!("{}\n\n{}", system, user)),
                }],
            }],
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens: MAX_OUTPUT_TOKENS,
                response_mime_type: schema.map(|_| "application/json".to_string()),
                response_json_schema: schema.cloned(),
            },
        }
    }
}

#[async_trait]
impl AIBackend for GeminiBackend {
    async fn chat(
        &self,
        system: &str,
        user: &str,
        schema: Option<&Value>,
        temperature: f32,
    ) -> Result<String> {
        let request = Self::build_request(system, user, schema, temperature);
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        debug!(model = %self.model, "Sending Gemini generateContent request");

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::AIRequestFailed(format!(
                "Gemini API request failed ({}): {}",
                status, body
            )));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body).map_err(|e| {
            Error::AIResponseMalformed(format!("Invalid Gemini response body: {}", e))
        })?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| {
                Error::AIResponseMalformed("Invalid Gemini API response structure".into())
            })
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_json_schema: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}
