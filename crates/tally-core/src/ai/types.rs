//! Shared types for AI backends

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One normalization returned by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationSuggestion {
    /// Clean label for the raw string
    pub normalized: String,
    /// Pattern (without delimiters) matching variations of the raw string
    #[serde(default)]
    pub regex: Option<String>,
}

/// Structured response expected from a normalization prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationResponse {
    pub normalizations: Vec<NormalizationSuggestion>,
}

/// JSON schema passed to backends that support structured output
pub fn normalization_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "normalizations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "normalized": { "type": "string" },
                        "regex": { "type": "string" }
                    },
                    "required": ["normalized", "regex"]
                }
            }
        },
        "required": ["normalizations"]
    })
}
