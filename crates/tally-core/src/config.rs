//! Tally configuration file
//!
//! Loaded from `~/.local/share/tally/config.toml` (or an explicit path).
//! Every key is optional; a missing file means all defaults.
//!
//! ```toml
//! [import]
//! currency = "GBP"
//! chunk_size = 100
//!
//! [ai]
//! temperature = 0.3
//! model = "gemini-2.0-flash-exp"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::import::ImportConfig;

/// Sampling temperature for normalization prompts
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// AI settings that apply regardless of backend
#[derive(Debug, Clone, PartialEq)]
pub struct AiSettings {
    pub temperature: f32,
    /// Overrides the backend's model from the environment
    pub model: Option<String>,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            model: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub import: ImportConfig,
    pub ai: AiSettings,
}

impl Config {
    /// Load from `path`, or from the default location when `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        p.display()
                    )));
                }
                Some(p.to_path_buf())
            }
            None => default_config_path().filter(|p| p.exists()),
        };

        match path {
            Some(p) => {
                let content = fs::read_to_string(&p)
                    .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;
                Self::parse(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from TOML content
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

        let mut config = Config::default();

        if let Some(import) = raw.import {
            if let Some(currency) = import.currency {
                config.import = config.import.with_currency(&currency)?;
            }
            if let Some(chunk_size) = import.chunk_size {
                config.import = config.import.with_chunk_size(chunk_size)?;
            }
        }

        if let Some(ai) = raw.ai {
            if let Some(temperature) = ai.temperature {
                if !(0.0..=2.0).contains(&temperature) {
                    return Err(Error::Config(format!(
                        "ai.temperature must be between 0 and 2, got {}",
                        temperature
                    )));
                }
                config.ai.temperature = temperature;
            }
            config.ai.model = ai.model.filter(|m| !m.trim().is_empty());
        }

        Ok(config)
    }
}

/// Default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("config.toml"))
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    import: Option<RawImport>,
    ai: Option<RawAi>,
}

#[derive(Debug, Deserialize)]
struct RawImport {
    currency: Option<String>,
    chunk_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawAi {
    temperature: Option<f32>,
    model: Option<String>,
}
