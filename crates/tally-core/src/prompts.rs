//! Prompt library for AI normalization
//!
//! Prompts are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/tally/prompts/overrides/)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! This allows users to tune prompts without modifying the source, while
//! automatically getting new default prompts on upgrade.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::NormalizationKind;

/// Embedded default prompts (compiled into binary)
mod defaults {
    pub const NORMALIZE_MERCHANTS: &str = include_str!("../../../prompts/normalize_merchants.md");
    pub const NORMALIZE_CATEGORIES: &str =
        include_str!("../../../prompts/normalize_categories.md");
}

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    NormalizeMerchants,
    NormalizeCategories,
}

impl PromptId {
    /// Get the string identifier for this prompt
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NormalizeMerchants => "normalize_merchants",
            Self::NormalizeCategories => "normalize_categories",
        }
    }

    /// The prompt used to normalize a cache kind
    pub fn for_kind(kind: NormalizationKind) -> Self {
        match kind {
            NormalizationKind::Merchant => Self::NormalizeMerchants,
            NormalizationKind::Category => Self::NormalizeCategories,
        }
    }

    fn default_content(&self) -> &'static str {
        match self {
            Self::NormalizeMerchants => defaults::NORMALIZE_MERCHANTS,
            Self::NormalizeCategories => defaults::NORMALIZE_CATEGORIES,
        }
    }
}

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    /// Version number for tracking changes
    pub version: u32,
    pub task_type: String,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct Prompt {
    pub metadata: PromptMetadata,
    /// The prompt content (system + user sections)
    pub content: String,
    /// Whether this came from an override file
    pub is_override: bool,
    pub override_path: Option<PathBuf>,
}

impl Prompt {
    /// Get the system section of the prompt
    pub fn system_section(&self) -> Option<&str> {
        extract_section(&self.content, "# System")
    }

    /// Get the user section of the prompt
    pub fn user_section(&self) -> Option<&str> {
        extract_section(&self.content, "# User")
    }

    /// Render the user section with `{{var}}` placeholders replaced
    ///
    /// Falls back to the whole body when the prompt has no `# User` header.
    pub fn render_user(&self, vars: &HashMap<&str, &str>) -> String {
        let template = self.user_section().unwrap_or(&self.content);
        render(template, vars)
    }
}

/// Single left-to-right pass; substituted text is never rescanned and
/// unknown placeholders are left as written
fn render(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let substitution = after
            .find("}}")
            .and_then(|end| vars.get(&after[..end]).map(|value| (end, *value)));

        match substitution {
            Some((end, value)) => {
                out.push_str(value);
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Prompt library for loading and caching prompts
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Create a new prompt library with default paths
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            cache: HashMap::new(),
        }
    }

    /// Create a prompt library with a custom override directory
    pub fn with_override_dir(path: PathBuf) -> Self {
        Self {
            override_dir: Some(path),
            cache: HashMap::new(),
        }
    }

    /// Create a prompt library with no override directory (embedded only)
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    /// Get a prompt by ID, loading from override or default
    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = self.load(id)?;
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("Prompt {}", id.as_str())))
    }

    fn load(&self, id: PromptId) -> Result<Prompt> {
        if let Some(path) = self.override_path(id).filter(|p| p.exists()) {
            let content = fs::read_to_string(&path).map_err(|e| {
                Error::InvalidData(format!("Failed to read prompt override: {}", e))
            })?;
            let (metadata, body) = parse_prompt(&content)?;
            return Ok(Prompt {
                metadata,
                content: body,
                is_override: true,
                override_path: Some(path),
            });
        }

        let (metadata, body) = parse_prompt(id.default_content())?;
        Ok(Prompt {
            metadata,
            content: body,
            is_override: false,
            override_path: None,
        })
    }

    fn override_path(&self, id: PromptId) -> Option<PathBuf> {
        self.override_dir
            .as_ref()
            .map(|d| d.join(format!("{}.md", id.as_str())))
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("prompts").join("overrides"))
}

/// Parse a prompt file into metadata and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();

    if !content.starts_with("---") {
        return Err(Error::InvalidData(
            "Prompt must start with YAML frontmatter (---)".into(),
        ));
    }

    let rest = &content[3..];
    let end = rest.find("---").ok_or_else(|| {
        Error::InvalidData("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let frontmatter = rest[..end].trim();
    let body = rest[end + 3..].trim();

    let metadata: PromptMetadata = serde_yaml::from_str(frontmatter)
        .map_err(|e| Error::InvalidData(format!("Invalid prompt frontmatter: {}", e)))?;

    Ok((metadata, body.to_string()))
}

/// Extract a section from the prompt content
fn extract_section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)?;
    let after_header = &content[start + header.len()..];
    let end = after_header.find("\n# ").unwrap_or(after_header.len());
    Some(after_header[..end].trim())
}
