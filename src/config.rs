//! TOML configuration.
//!
//! Every section except `[db]` is optional; omitted fields fall back to the
//! defaults below. See `config/evh.example.toml` for a full example.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunk::DEFAULT_MAX_TOKENS;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub contacts: ContactsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// `"cl100k"` (BPE) or `"chars"` (4 chars per token).
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            tokenizer: default_tokenizer(),
        }
    }
}

fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}
fn default_tokenizer() -> String {
    "cl100k".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion token cap sent with each request.
    #[serde(default = "default_completion_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_url: default_api_url(),
            temperature: default_temperature(),
            max_tokens: default_completion_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_completion_tokens() -> u32 {
    4096
}
fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DispatchConfig {
    /// Concurrent LLM calls per request. Defaults to the available
    /// parallelism, capped at 16.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

/// Upper bound on the derived default concurrency.
const DEFAULT_CONCURRENCY_CAP: usize = 16;

impl DispatchConfig {
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(DEFAULT_CONCURRENCY_CAP)
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Used when a request omits `user_timezone`.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    /// Used when a request omits `user_email`.
    #[serde(default = "default_user")]
    pub default_user: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            default_timezone: default_timezone(),
            default_user: default_user(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5001".to_string()
}
fn default_timezone() -> String {
    "America/New_York".to_string()
}
fn default_user() -> String {
    "local@localhost".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContactsConfig {
    /// Suggestions returned by `/contacts` when the request has no `limit`.
    /// `0` means no limit.
    #[serde(default = "default_suggest_limit")]
    pub suggest_limit: usize,
}

impl ContactsConfig {
    pub fn limit(&self) -> Option<usize> {
        (self.suggest_limit > 0).then_some(self.suggest_limit)
    }
}

impl Default for ContactsConfig {
    fn default() -> Self {
        Self {
            suggest_limit: default_suggest_limit(),
        }
    }
}

fn default_suggest_limit() -> usize {
    5
}

impl Config {
    /// Defaults everywhere, with the database at `./data/evh.sqlite`.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/evh.sqlite"),
                max_connections: default_max_connections(),
            },
            chunking: ChunkingConfig::default(),
            llm: LlmConfig::default(),
            dispatch: DispatchConfig::default(),
            server: ServerConfig::default(),
            contacts: ContactsConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    match config.chunking.tokenizer.as_str() {
        "cl100k" | "chars" => {}
        other => anyhow::bail!(
            "Unknown tokenizer: '{}'. Must be cl100k or chars.",
            other
        ),
    }

    if let Some(n) = config.dispatch.max_concurrency {
        if !(1..=64).contains(&n) {
            anyhow::bail!("dispatch.max_concurrency must be in [1, 64]");
        }
    }

    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be > 0");
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}
