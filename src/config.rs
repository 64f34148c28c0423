//! TOML configuration.
//!
//! Every section is optional; omitted keys fall back to the defaults below.
//! [`load_config`] parses and validates a file, [`Config::minimal`] gives
//! the defaults for commands that can run without one.
//!
//! ```toml
//! [db]
//! path = "./data/doco.sqlite"
//!
//! [chunking]
//! size = 500
//! overlap = 50
//!
//! [retrieval]
//! top_k = 5
//! num_candidates = 100
//!
//! [store]
//! ttl_minutes = 25
//! purge_interval_secs = 60
//!
//! [gemini]
//! api_key_env = "GEMINI_API_KEY"
//!
//! [extraction]
//! provider = "gemini"        # or "local"
//!
//! [embedding]
//! provider = "gemini"        # gemini | openai | ollama | local | disabled
//!
//! [server]
//! bind = "127.0.0.1:3000"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use doco_core::chunk::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use doco_core::store::DEFAULT_CHUNK_TTL_MINUTES;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Defaults only. Used by commands that never touch the database or a
    /// provider when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/doco.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Hits placed in the context block.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_num_candidates")]
    pub num_candidates: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            num_candidates: default_num_candidates(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_num_candidates() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: i64,
    /// How often `doco serve` deletes expired rows. 0 disables the task.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: DEFAULT_CHUNK_TTL_MINUTES,
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

fn default_ttl_minutes() -> i64 {
    DEFAULT_CHUNK_TTL_MINUTES
}
fn default_purge_interval_secs() -> u64 {
    60
}

/// Connection settings shared by every Gemini-backed adapter.
#[derive(Debug, Deserialize, Clone)]
pub struct GeminiConfig {
    /// Inline API key. Prefer `api_key_env`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_gemini_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_gemini_base_url(),
            timeout_secs: default_gemini_timeout_secs(),
            max_retries: 0,
        }
    }
}

impl GeminiConfig {
    /// The inline key if set, otherwise the value of `api_key_env`.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.clone());
        }
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => bail!(
                "Gemini API key not set: set gemini.api_key or the {} environment variable",
                self.api_key_env
            ),
        }
    }
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_gemini_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_gemini_provider")]
    pub provider: String,
    #[serde(default = "default_flash_model")]
    pub model: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: default_gemini_provider(),
            model: default_flash_model(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_gemini_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Prepended to query texts by providers without task types.
    #[serde(default)]
    pub query_prefix: Option<String>,
    /// Prepended to document texts by providers without task types.
    #[serde(default)]
    pub document_prefix: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_gemini_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: 0,
            timeout_secs: default_timeout_secs(),
            query_prefix: None,
            document_prefix: None,
        }
    }
}

fn default_batch_size() -> usize {
    100
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_gemini_provider")]
    pub provider: String,
    #[serde(default = "default_flash_model")]
    pub model: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_gemini_provider(),
            model: default_flash_model(),
        }
    }
}

fn default_gemini_provider() -> String {
    "gemini".to_string()
}
fn default_flash_model() -> String {
    "gemini-2.5-flash".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// JSON file holding history and theme.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("./data/client_state.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing` filter directive. `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.size == 0 {
        bail!("chunking.size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.size {
        bail!("chunking.overlap must be smaller than chunking.size");
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.num_candidates < config.retrieval.top_k {
        bail!("retrieval.num_candidates must be >= retrieval.top_k");
    }

    if config.store.ttl_minutes < 1 {
        bail!("store.ttl_minutes must be >= 1");
    }

    match config.extraction.provider.as_str() {
        "gemini" | "local" => {}
        other => bail!(
            "Unknown extraction provider: '{}'. Must be gemini or local.",
            other
        ),
    }

    match config.embedding.provider.as_str() {
        "gemini" | "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be gemini, openai, ollama, local, or disabled.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.generation.provider.as_str() {
        "gemini" => {}
        other => bail!("Unknown generation provider: '{}'. Must be gemini.", other),
    }

    if tracing_subscriber::EnvFilter::try_new(&config.logging.level).is_err() {
        bail!("logging.level is not a valid filter: '{}'", config.logging.level);
    }

    Ok(())
}
