//! Mock backend for testing
//!
//! Replies are taken from a FIFO script when one is queued. With an empty
//! script the mock answers a normalization prompt by title-casing each listed
//! item and deriving a pattern from its leading words, so pipelines can run
//! end to end without a model. Every call is recorded for assertions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Error, Result};

use super::AIBackend;

/// A chat call as seen by the mock
#[derive(Debug, Clone)]
pub struct MockCall {
    pub system: String,
    pub user: String,
    pub schema: Option<Value>,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
enum Reply {
    Content(String),
    Failure(String),
}

/// Mock AI backend for testing
///
/// Clones share the same script and call log.
#[derive(Clone, Default)]
pub struct MockBackend {
    script: Arc<Mutex<VecDeque<Reply>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    model: Option<String>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new instance with a different model name (shares state)
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: Some(model.to_string()),
            ..self.clone()
        }
    }

    /// Queue a raw text reply
    pub fn push_response(&self, content: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Reply::Content(content.into()));
        }
    }

    /// Queue a `{"normalizations": [...]}` reply from (label, pattern) pairs
    pub fn push_normalizations(&self, items: &[(&str, &str)]) {
        let normalizations: Vec<Value> = items
            .iter()
            .map(|(normalized, regex)| json!({ "normalized": normalized, "regex": regex }))
            .collect();
        self.push_response(json!({ "normalizations": normalizations }).to_string());
    }

    /// Queue a transport failure
    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Reply::Failure(message.into()));
        }
    }

    /// All calls made so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn next_reply(&self) -> Option<Reply> {
        self.script.lock().ok().and_then(|mut s| s.pop_front())
    }
}

/// Items listed in a normalization prompt as `N. raw` under a
/// "... to normalize:" line
pub(crate) fn listed_items(prompt: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut in_list = false;

    for line in prompt.lines() {
        let line = line.trim();
        if !in_list {
            in_list = line.to_lowercase().ends_with("to normalize:");
            continue;
        }

        let item = line.split_once(". ").and_then(|(n, rest)| {
            (!n.is_empty() && n.chars().all(|c| c.is_ascii_digit())).then_some(rest)
        });
        match item {
            Some(rest) => items.push(rest.to_string()),
            None if items.is_empty() && line.is_empty() => continue,
            None => break,
        }
    }

    items
}

/// Leading words of a raw string, stopping at reference-looking noise
fn leading_words(raw: &str) -> Vec<&str> {
    let head = raw.split('*').next().unwrap_or(raw);
    let words: Vec<&str> = head
        .split_whitespace()
        .take_while(|w| !w.chars().any(|c| c.is_ascii_digit()))
        .take(2)
        .collect();

    if words.is_empty() {
        raw.split_whitespace().take(1).collect()
    } else {
        words
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Deterministic (label, pattern) guess for a raw string
pub(crate) fn default_normalization(raw: &str) -> (String, String) {
    let words = leading_words(raw);
    let label = words.iter().map(|w| title_case(w)).collect::<Vec<_>>().join(" ");
    let pattern = format!(
        "{}.*",
        words
            .iter()
            .map(|w| regex::escape(&w.to_uppercase()))
            .collect::<Vec<_>>()
            .join(r"\s+")
    );
    (label, pattern)
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn chat(
        &self,
        system: &str,
        user: &str,
        schema: Option<&Value>,
        temperature: f32,
    ) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockCall {
                system: system.to_string(),
                user: user.to_string(),
                schema: schema.cloned(),
                temperature,
            });
        }

        match self.next_reply() {
            Some(Reply::Content(content)) => Ok(content),
            Some(Reply::Failure(message)) => Err(Error::AIRequestFailed(message)),
            None => {
                let normalizations: Vec<Value> = listed_items(user)
                    .iter()
                    .map(|raw| {
                        let (normalized, regex) = default_normalization(raw);
                        json!({ "normalized": normalized, "regex": regex })
                    })
                    .collect();
                Ok(json!({ "normalizations": normalizations }).to_string())
            }
        }
    }

    fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("mock")
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
