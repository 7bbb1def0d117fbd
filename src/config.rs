//! TOML configuration with environment overrides.
//!
//! Every section has serde defaults, so an empty file (or no file at all)
//! yields a usable configuration. Secrets and deployment-specific URLs are
//! normally supplied through the environment instead of the file:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `GITHUB_TOKEN` | `github.token` |
//! | `SMEE_URL` | `relay.url` |
//! | `MCP_SERVER_URL` | `analysis.url` |
//! | `GITHUB_WEBHOOK_SECRET` | `server.webhook_secret` |
//! | `COMMITLENS_BIND` | `server.bind` |

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub delegate: DelegateConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub requirements: RequirementsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub judge: JudgeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Shared secret for `X-Hub-Signature-256` verification. Unset disables the check.
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            webhook_secret: None,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_raw_base")]
    pub raw_base: String,
    /// Files reported larger than this (bytes) are fetched from the raw endpoint.
    #[serde(default = "default_large_file_threshold")]
    pub large_file_threshold: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_api_base(),
            raw_base: default_raw_base(),
            large_file_threshold: default_large_file_threshold(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_raw_base() -> String {
    "https://raw.githubusercontent.com".to_string()
}
fn default_large_file_threshold() -> u64 {
    1_000_000
}
fn default_timeout_secs() -> u64 {
    30
}

/// How commit data is retrieved.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Call the GitHub REST API from the webhook process.
    #[default]
    Direct,
    /// Ask a `commitlens tools` child process over the tool protocol.
    Delegated,
}

impl SourceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::Direct => "direct",
            SourceMode::Delegated => "delegated",
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourceConfig {
    #[serde(default)]
    pub mode: SourceMode,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DelegateConfig {
    /// Command line of the tool server. Empty means `<current exe> tools`.
    #[serde(default)]
    pub command: Vec<String>,
    /// Let a tool-calling model decide which tool to invoke.
    #[serde(default)]
    pub route_with_model: bool,
    #[serde(default = "default_ollama_url")]
    pub model_url: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_router_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DelegateConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            route_with_model: false,
            model_url: default_ollama_url(),
            model: default_chat_model(),
            temperature: default_router_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_router_temperature() -> f32 {
    0.8
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    /// Public relay channel URL (e.g. `https://smee.io/<channel>`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_relay_target")]
    pub target: String,
    #[serde(default = "default_relay_program")]
    pub program: Vec<String>,
    /// Run the command line through `sh -c` instead of exec'ing it directly.
    #[serde(default)]
    pub shell: bool,
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    /// Refuse to serve when no relay URL is configured.
    #[serde(default = "default_true")]
    pub required: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: None,
            target: default_relay_target(),
            program: default_relay_program(),
            shell: false,
            grace_secs: default_grace_secs(),
            required: true,
        }
    }
}

fn default_relay_target() -> String {
    "http://localhost:8000/webhook".to_string()
}
fn default_relay_program() -> Vec<String> {
    vec!["npx".to_string(), "smee-client".to_string()]
}
fn default_grace_secs() -> u64 {
    5
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_analysis_url")]
    pub url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_analysis_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_analysis_url() -> String {
    "http://localhost:8001".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RequirementsConfig {
    /// Run the matcher on every fetched file while serving.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_requirements_document")]
    pub document: PathBuf,
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RequirementsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            document: default_requirements_document(),
            index_dir: default_index_dir(),
            collection: default_collection(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
        }
    }
}

fn default_requirements_document() -> PathBuf {
    PathBuf::from("./docs/RFP_requirements.md")
}
fn default_index_dir() -> PathBuf {
    PathBuf::from("./data/requirements_index")
}
fn default_collection() -> String {
    "requirements_list".to_string()
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    100
}
fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct JudgeConfig {
    #[serde(default = "default_judge_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_judge_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            provider: default_judge_provider(),
            model: default_chat_model(),
            url: default_ollama_url(),
            temperature: None,
            timeout_secs: default_judge_timeout_secs(),
        }
    }
}

impl JudgeConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_judge_provider() -> String {
    "ollama".to_string()
}
fn default_chat_model() -> String {
    "qwen3:4b".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_judge_timeout_secs() -> u64 {
    120
}

/// Load configuration from `path`.
///
/// A missing file is only tolerated when `allow_missing` is set (the CLI
/// passes `true` for its default path); the built-in defaults are used then.
/// Environment overrides are applied afterwards in both cases.
pub fn load_config(path: &Path, allow_missing: bool) -> Result<Config> {
    let mut config = if !path.exists() && allow_missing {
        Config::default()
    } else {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    };

    config.apply_env(|key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

impl Config {
    /// Overlay values from the environment. `lookup` is injected so tests
    /// don't have to mutate the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(url) = non_empty("SMEE_URL") {
            self.relay.url = Some(url);
        }
        if let Some(url) = non_empty("MCP_SERVER_URL") {
            self.analysis.url = url;
        }
        if let Some(secret) = non_empty("GITHUB_WEBHOOK_SECRET") {
            self.server.webhook_secret = Some(secret);
        }
        if let Some(bind) = non_empty("COMMITLENS_BIND") {
            self.server.bind = bind;
        }
    }
}

pub fn validate(config: &Config) -> Result<()> {
    let req = &config.requirements;
    if req.chunk_size == 0 {
        anyhow::bail!("requirements.chunk_size must be > 0");
    }
    if req.chunk_overlap >= req.chunk_size {
        anyhow::bail!(
            "requirements.chunk_overlap ({}) must be smaller than chunk_size ({})",
            req.chunk_overlap,
            req.chunk_size
        );
    }
    if req.top_k == 0 {
        anyhow::bail!("requirements.top_k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }
    if config.embedding.provider == "openai" && config.embedding.model.is_none() {
        anyhow::bail!("embedding.model must be specified when provider is 'openai'");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.judge.provider.as_str() {
        "disabled" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown judge provider: '{}'. Must be disabled or ollama.",
            other
        ),
    }

    if config.relay.program.is_empty() {
        anyhow::bail!("relay.program must name at least the executable");
    }

    Ok(())
}
