//! Configuration loading and management for skimmer.
//!
//! Loads settings from `skimmer.toml` with environment variable overrides for
//! sensitive data. Every section has working defaults, so running without a
//! config file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::chroma::DEFAULT_COLLECTION;
use crate::extract::DEFAULT_FETCH_TIMEOUT;
use crate::index::{DEFAULT_SEARCH_LIMIT, DEFAULT_SIMILARITY_THRESHOLD};
use crate::llm::DEFAULT_LLM_TIMEOUT;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing API key for provider: {0}")]
    MissingApiKey(String),
}

/// Generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Backend: "openai" (any OpenAI-compatible server) or "anthropic"
    pub provider: String,
    /// Model identifier (e.g. "gpt-4o-mini")
    pub model: String,
    /// Base URL, only used by OpenAI-compatible servers
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com".to_string(),
            timeout_secs: DEFAULT_LLM_TIMEOUT.as_secs(),
        }
    }
}

/// Embedding backend configuration. Always an OpenAI-compatible endpoint,
/// regardless of which provider generates text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model identifier (e.g. "text-embedding-3-small")
    pub model: String,
    /// Base URL of the embeddings endpoint
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            base_url: "https://api.openai.com".to_string(),
        }
    }
}

/// API keys (loaded from environment)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub openai_key: Option<String>,
    #[serde(default)]
    pub anthropic_key: Option<String>,
}

/// Embedding index and vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub host: String,
    pub port: u16,
    pub collection: String,
    /// Search results below this similarity are dropped
    pub similarity_threshold: f32,
    /// Default number of search results
    pub search_limit: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
            collection: DEFAULT_COLLECTION.to_string(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

/// Content extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Per-fetch timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
        }
    }
}

/// Storage paths configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base path for the article archive
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data"),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub api: ApiConfig,
    pub index: IndexConfig,
    pub extraction: ExtractionConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from the default location (skimmer.toml in cwd or
    /// `~/.config/skimmer/`), falling back to defaults when neither exists.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default().with_env_overrides()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config.with_env_overrides())
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let local_config = PathBuf::from("skimmer.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config").join("skimmer").join("skimmer.toml");
            if home_config.exists() {
                return Some(home_config);
            }
        }

        None
    }

    /// Override API keys from environment variables
    fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.api.openai_key = Some(key);
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            self.api.anthropic_key = Some(key);
        }
        self
    }
}
