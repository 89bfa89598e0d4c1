//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API:
//! OpenAI itself, vLLM, LocalAI, llama-server / llama.cpp, and others.
//!
//! # Configuration
//!
//! Environment variables:
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: gpt-4o-mini)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{Error, Result};

use super::{AIBackend, DEFAULT_TIMEOUT_SECS};

/// OpenAI-compatible backend
///
/// ```rust,ignore
/// // vLLM
/// export AI_BACKEND=openai_compatible
/// export OPENAI_COMPATIBLE_HOST="http://192.168.1.100:8000"
/// export OPENAI_COMPATIBLE_MODEL="meta-llama/Llama-3.2-3B-Instruct"
/// ```
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
        }
    }

    /// Create with an API key
    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            api_key: Some(api_key.to_string()),
            ..Self::new(base_url, model)
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
    /// Required: `OPENAI_COMPATIBLE_HOST`
    /// Optional: `OPENAI_COMPATIBLE_MODEL` (default: gpt-4o-mini)
    /// Optional: `OPENAI_COMPATIBLE_API_KEY`
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OPENAI_COMPATIBLE_HOST").ok()?;
        let model = std::env::var("OPENAI_COMPATIBLE_MODEL")
            .unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let mut backend = Self::new(&host, &model);
        backend.api_key = std::env::var("OPENAI_COMPATIBLE_API_KEY").ok();
        Some(backend)
    }

    fn build_request(
        &self,
        system: &str,
        user: &str,
        schema: Option<&Value>,
        temperature: f32,
    ) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature,
            response_format: schema.map(|schema| {
                json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": "response",
                        "schema": schema,
                    }
                })
            }),
            stream: false,
        }
    }
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
    async fn chat(
        &self,
        system: &str,
        user: &str,
        schema: Option<&Value>,
        temperature: f32,
    ) -> Result<String> {
        let request = self.build_request(system, user, schema, temperature);

        debug!(model = %self.model, host = %self.base_url, "Sending chat completion request");

        let mut req_builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::AIRequestFailed(format!(
                "OpenAI API error {}: {}",
                status, body
            )));
        }

        let chat_response: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            Error::AIResponseMalformed(format!("Invalid chat completion body: {}", e))
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::AIResponseMalformed("No response from OpenAI API".into()))
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}
