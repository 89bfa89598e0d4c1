//! Merchant and category normalization
//!
//! Raw strings are resolved in three tiers, cheapest first:
//!
//! 1. **Exact**: the raw string already has a cache row.
//! 2. **Regex**: a learned pattern matches it. The hit is written back as an
//!    exact row (no pattern) so the next lookup stops at tier 1.
//! 3. **AI**: everything left goes to the model in a single call, and the
//!    returned labels and patterns are learned.
//!
//! Cache rows are shared by every import run. Writes are upserts keyed on
//! the pattern, so two runs learning the same pattern at once end up with a
//! single row rather than a constraint violation.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, warn};

use crate::ai::parsing::parse_normalizations;
use crate::ai::{normalization_schema, AIBackend, AIClient, NormalizationSuggestion};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{NewNormalization, NormalizationKind};
use crate::prompts::{PromptId, PromptLibrary};

/// How many strings each tier resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionStats {
    pub exact: usize,
    pub regex: usize,
    pub ai: usize,
}

impl ResolutionStats {
    pub fn total(&self) -> usize {
        self.exact + self.regex + self.ai
    }

    /// Accumulate another chunk's counts
    pub fn add(&mut self, other: &ResolutionStats) {
        self.exact += other.exact;
        self.regex += other.regex;
        self.ai += other.ai;
    }
}

/// Result of one resolve call
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// raw string -> normalized label, one entry per input
    pub mapping: HashMap<String, String>,
    pub stats: ResolutionStats,
}

impl Resolution {
    pub fn get(&self, raw: &str) -> Option<&str> {
        self.mapping.get(raw).map(String::as_str)
    }
}

/// Resolves raw merchant/category strings against the shared cache
pub struct NormalizationResolver<'a> {
    db: &'a Database,
    ai: &'a AIClient,
    temperature: f32,
    prompts: Mutex<PromptLibrary>,
}

impl<'a> NormalizationResolver<'a> {
    pub fn new(db: &'a Database, ai: &'a AIClient, temperature: f32) -> Self {
        Self::with_prompts(db, ai, temperature, PromptLibrary::new())
    }

    /// Use a specific prompt library (tests use `PromptLibrary::embedded_only`)
    pub fn with_prompts(
        db: &'a Database,
        ai: &'a AIClient,
        temperature: f32,
        prompts: PromptLibrary,
    ) -> Self {
        Self {
            db,
            ai,
            temperature,
            prompts: Mutex::new(prompts),
        }
    }

    /// Resolve every raw string to a normalized label
    ///
    /// Duplicates are collapsed. Blank strings map to themselves and never
    /// reach the cache or the model.
    pub async fn resolve(&self, kind: NormalizationKind, raws: &[String]) -> Result<Resolution> {
        let mut resolution = Resolution::default();

        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for raw in raws {
            if !seen.insert(raw.as_str()) {
                continue;
            }
            if raw.trim().is_empty() {
                resolution.mapping.insert(raw.clone(), raw.clone());
            } else {
                pending.push(raw.clone());
            }
        }

        if pending.is_empty() {
            return Ok(resolution);
        }

        // Tier 1: exact
        let exact = self.db.find_exact_normalizations(kind, &pending)?;
        resolution.stats.exact = exact.len();
        pending.retain(|raw| !exact.contains_key(raw));
        resolution.mapping.extend(exact);

        // Tier 2: regex
        if !pending.is_empty() {
            let matched = self.match_patterns(kind, &pending)?;
            if !matched.is_empty() {
                self.db.insert_regex_matches(kind, &matched)?;
            }
            resolution.stats.regex = matched.len();
            let matched: HashMap<String, String> = matched.into_iter().collect();
            pending.retain(|raw| !matched.contains_key(raw));
            resolution.mapping.extend(matched);
        }

        // Tier 3: AI
        if !pending.is_empty() {
            let suggestions = self.ask_model(kind, &pending).await?;
            let learned = self.learn(kind, &pending, suggestions)?;
            resolution.stats.ai = learned.len();
            resolution.mapping.extend(learned);
        }

        debug!(
            kind = %kind,
            exact = resolution.stats.exact,
            regex = resolution.stats.regex,
            ai = resolution.stats.ai,
            "Resolved normalizations"
        );

        Ok(resolution)
    }

    /// Match raw strings against stored patterns, first (oldest) match wins
    fn match_patterns(
        &self,
        kind: NormalizationKind,
        raws: &[String],
    ) -> Result<Vec<(String, String)>> {
        let entries = self.db.list_regex_normalizations(kind)?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut patterns: Vec<(Regex, String)> = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(pattern) = entry.regex_pattern else {
                continue;
            };
            match compile(&pattern) {
                Ok(re) => patterns.push((re, entry.normalized)),
                Err(e) => {
                    warn!(kind = %kind, id = entry.id, pattern = %pattern, error = %e, "Skipping invalid stored pattern");
                }
            }
        }

        let matched = raws
            .iter()
            .filter_map(|raw| {
                patterns
                    .iter()
                    .find(|(re, _)| re.is_match(raw))
                    .map(|(_, label)| (raw.clone(), label.clone()))
            })
            .collect();

        Ok(matched)
    }

    /// One chat call covering every unresolved string
    async fn ask_model(
        &self,
        kind: NormalizationKind,
        raws: &[String],
    ) -> Result<Vec<NormalizationSuggestion>> {
        let categories = match kind {
            NormalizationKind::Category => {
                let categories = self.db.list_default_categories()?;
                if categories.is_empty() {
                    return Err(Error::NoDefaultCategories);
                }
                Some(categories.join(", "))
            }
            NormalizationKind::Merchant => None,
        };

        let items = numbered_list(raws);

        let (system, user) = {
            let mut prompts = self
                .prompts
                .lock()
                .map_err(|_| Error::InvalidData("Failed to acquire prompt library lock".into()))?;
            let template = prompts.get(PromptId::for_kind(kind))?;
            let mut vars = HashMap::new();
            vars.insert("items", items.as_str());
            if let Some(categories) = &categories {
                vars.insert("categories", categories.as_str());
            }
            (
                template.system_section().unwrap_or_default().to_string(),
                template.render_user(&vars),
            )
        };

        let schema = normalization_schema();
        let content = self
            .ai
            .chat(&system, &user, Some(&schema), self.temperature)
            .await?;

        parse_normalizations(&content, raws.len())
    }

    /// Persist model output and return the raw -> label mapping
    ///
    /// Only the first raw string carrying a given pattern keeps it; later
    /// ones are stored without a pattern and resolve by exact match.
    fn learn(
        &self,
        kind: NormalizationKind,
        raws: &[String],
        suggestions: Vec<NormalizationSuggestion>,
    ) -> Result<HashMap<String, String>> {
        let mut claimed: HashSet<String> = HashSet::new();
        let mut mapping = HashMap::with_capacity(raws.len());
        let mut entries = Vec::with_capacity(raws.len());

        for (raw, suggestion) in raws.iter().zip(suggestions) {
            let label = match suggestion.normalized.trim() {
                "" => raw.clone(),
                label => label.to_string(),
            };

            let regex_pattern = suggestion
                .regex
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .filter(|p| match compile(p) {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(kind = %kind, raw = %raw, pattern = %p, error = %e, "Discarding invalid pattern from model");
                        false
                    }
                })
                .filter(|p| claimed.insert(p.clone()));

            mapping.insert(raw.clone(), label.clone());
            entries.push(NewNormalization {
                raw: raw.clone(),
                normalized: label,
                regex_pattern,
            });
        }

        self.db.upsert_learned_normalizations(kind, &entries)?;
        Ok(mapping)
    }
}

fn compile(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// `1. first\n2. second` for the prompt
fn numbered_list(raws: &[String]) -> String {
    raws.iter()
        .enumerate()
        .map(|(i, raw)| format!("{}. {}", i + 1, raw))
        .collect::<Vec<_>>()
        .join("\n")
}
