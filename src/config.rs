//! Configuration file parsing and management for SheetQL.
//!
//! Handles loading configuration from TOML files, applying environment
//! overrides and validating provider URLs.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{Result, SheetqlError};
use crate::intent::IntentDefaults;
use crate::llm::LlmProvider;
use crate::store::{DEFAULT_MAX_ROWS, DEFAULT_QUERY_TIMEOUT_SECS};

/// Environment variable selecting the LLM provider.
pub const PROVIDER_ENV: &str = "SHEETQL_LLM_PROVIDER";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
    /// LLM settings.
    #[serde(default)]
    pub llm: LlmSettings,

    /// Query execution limits.
    #[serde(default)]
    pub query: QuerySettings,

    /// Columns substituted when a question leaves them implicit.
    #[serde(default)]
    pub defaults: IntentDefaults,
}

/// LLM provider settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LlmSettings {
    /// LLM provider (openai, ollama, mock).
    #[serde(default)]
    pub provider: LlmProvider,

    /// Model name; each provider has its own default.
    #[serde(default)]
    pub model: Option<String>,

    /// Base URL of the provider API.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// API key. Only ever read from the environment, never from the file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

/// Limits applied to every query.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QuerySettings {
    /// Statement timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum number of rows returned.
    pub max_rows: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

impl QuerySettings {
    /// Returns the timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Returns the default config file path.
    ///
    /// - Linux: `~/.config/sheetql/config.toml`
    /// - macOS: `~/Library/Application Support/sheetql/config.toml`
    /// - Windows: `%APPDATA%\sheetql\config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sheetql")
            .join("config.toml")
    }

    /// Loads configuration from `path` (or the default location), then
    /// applies `.env` and process environment overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(SheetqlError::config(format!("Failed to read .env file: {e}")));
            }
        }

        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        debug!(path = %path.display(), "Loading configuration");

        let mut config = Self::load_from_file(&path)?;
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| SheetqlError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            SheetqlError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies environment overrides through `lookup`.
    ///
    /// The provider is resolved first so that provider-specific variables
    /// only touch the settings of the provider actually in use.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = lookup(PROVIDER_ENV) {
            self.llm.provider = provider
                .parse::<LlmProvider>()
                .map_err(SheetqlError::config)?;
        }

        match self.llm.provider {
            LlmProvider::OpenAi => {
                if let Some(url) = lookup("OPENAI_BASE_URL") {
                    self.llm.base_url = Some(url);
                }
                if let Some(model) = lookup("OPENAI_MODEL") {
                    self.llm.model = Some(model);
                }
            }
            LlmProvider::Ollama => {
                if let Some(url) = lookup("OLLAMA_URL") {
                    self.llm.base_url = Some(url);
                }
                if let Some(model) = lookup("OLLAMA_MODEL") {
                    self.llm.model = Some(model);
                }
            }
            LlmProvider::Mock => {}
        }

        self.llm.api_key = lookup("OPENAI_API_KEY");
        Ok(())
    }

    /// Checks values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<()> {
        if let Some(base_url) = &self.llm.base_url {
            validate_base_url(base_url)?;
        }
        if self.llm.timeout_secs == Some(0) {
            return Err(SheetqlError::config("llm.timeout_secs must be positive"));
        }
        if self.query.timeout_secs == 0 {
            return Err(SheetqlError::config("query.timeout_secs must be positive"));
        }
        if self.query.max_rows == 0 {
            return Err(SheetqlError::config("query.max_rows must be positive"));
        }
        if self.defaults.amount_column.trim().is_empty()
            || self.defaults.group_column.trim().is_empty()
        {
            return Err(SheetqlError::config("default columns must not be empty"));
        }
        Ok(())
    }
}

/// Validates that a provider base URL is an absolute http(s) URL.
pub fn validate_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| SheetqlError::config(format!("Invalid base URL '{raw}': {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(SheetqlError::config(format!(
            "Invalid scheme '{scheme}' in base URL '{raw}'. Expected http or https"
        ))),
    }
}
