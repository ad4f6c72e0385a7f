//! Configuration loading, validation, and management for AlzAssist.
//!
//! Loads configuration from `~/.alzassist/config.toml` with environment
//! variable overrides. Validates all settings at startup. The resulting
//! value is passed explicitly into constructors; nothing reads process
//! environment after `load()` returns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.alzassist/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Reasoning back-end
    #[serde(default)]
    pub reasoner: ReasonerConfig,

    /// Loop bounds and tool policy
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Curated corpus search service
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Open literature source
    #[serde(default)]
    pub external_literature: ExternalLiteratureConfig,

    #[serde(default)]
    pub knowledge_graph: KnowledgeGraphConfig,

    #[serde(default)]
    pub plotting: PlottingConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ReasonerConfig {
    /// Back-end name: "openrouter", "openai", "ollama", or any
    /// OpenAI-compatible endpoint given through `api_url`
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Overrides the provider's default base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_reasoner_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_reasoner_timeout() -> u64 {
    120
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_url: None,
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_reasoner_timeout(),
        }
    }
}

impl std::fmt::Debug for ReasonerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasonerConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// How strictly the primary-tool-first policy is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Every enabled tool is visible; out-of-order use is only reported
    #[default]
    Advisory,
    /// External tools stay hidden until the primary tool has been tried
    Gated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_per_tool_timeout_ms")]
    pub per_tool_timeout_ms: u64,

    /// Tool subset enabled for sessions; `None` enables every registered tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_tools: Option<Vec<String>>,

    #[serde(default)]
    pub routing: RoutingMode,

    /// Terminate when the primary corpus tool reports itself unavailable
    #[serde(default = "default_true")]
    pub fatal_on_primary_unavailable: bool,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_per_tool_timeout_ms() -> u64 {
    120_000
}
fn default_true() -> bool {
    true
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            per_tool_timeout_ms: default_per_tool_timeout_ms(),
            enabled_tools: None,
            routing: RoutingMode::default(),
            fatal_on_primary_unavailable: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Base URL of the corpus search service; unset means unavailable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_corpus")]
    pub default_corpus: String,

    /// Corpus name → index name on the search service
    #[serde(default = "default_corpora")]
    pub corpora: BTreeMap<String, String>,

    #[serde(default = "default_corpus_timeout")]
    pub timeout_secs: u64,
}

fn default_corpus() -> String {
    "medium".into()
}
fn default_corpora() -> BTreeMap<String, String> {
    [
        ("small", "pqa_index_small"),
        ("medium", "pqa_index_medium"),
        ("large", "pqa_index_large"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
fn default_corpus_timeout() -> u64 {
    300
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            default_corpus: default_corpus(),
            corpora: default_corpora(),
            timeout_secs: default_corpus_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalLiteratureConfig {
    #[serde(default = "default_europe_pmc")]
    pub base_url: String,

    #[serde(default = "default_max_results")]
    pub max_results: u32,

    #[serde(default = "default_external_timeout")]
    pub timeout_secs: u64,
}

fn default_europe_pmc() -> String {
    "https://www.ebi.ac.uk/europepmc/webservices/rest".into()
}
fn default_max_results() -> u32 {
    5
}
fn default_external_timeout() -> u64 {
    30
}

/// Europe PMC's useful page size; larger requests are rejected at load.
pub const MAX_EXTERNAL_RESULTS: u32 = 25;

impl Default for ExternalLiteratureConfig {
    fn default() -> Self {
        Self {
            base_url: default_europe_pmc(),
            max_results: default_max_results(),
            timeout_secs: default_external_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeGraphConfig {
    /// Directory holding `kg-alzheimers_nodes.tsv` and `kg-alzheimers_edges.tsv`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlottingConfig {
    #[serde(default = "default_plot_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_plot_url_prefix")]
    pub url_prefix: String,
}

fn default_plot_dir() -> PathBuf {
    PathBuf::from("static/plots")
}
fn default_plot_url_prefix() -> String {
    "/static/plots".into()
}

impl Default for PlottingConfig {
    fn default() -> Self {
        Self {
            output_dir: default_plot_dir(),
            url_prefix: default_plot_url_prefix(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.alzassist/config.toml).
    ///
    /// Environment overrides, applied after the file:
    /// - `ALZASSIST_API_KEY`, then `OPENROUTER_API_KEY`, then `OPENAI_API_KEY`
    ///   (only when the file sets no key)
    /// - `ALZASSIST_PROVIDER`, `ALZASSIST_MODEL`
    /// - `ALZASSIST_CORPUS_ENDPOINT`, `ALZASSIST_KG_DATA_DIR`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.reasoner.api_key.is_none() {
            self.reasoner.api_key = lookup("ALZASSIST_API_KEY")
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(provider) = lookup("ALZASSIST_PROVIDER") {
            self.reasoner.provider = provider;
        }
        if let Some(model) = lookup("ALZASSIST_MODEL") {
            self.reasoner.model = model;
        }
        if let Some(endpoint) = lookup("ALZASSIST_CORPUS_ENDPOINT") {
            self.corpus.endpoint = Some(endpoint);
        }
        if let Some(dir) = lookup("ALZASSIST_KG_DATA_DIR") {
            self.knowledge_graph.data_dir = Some(PathBuf::from(dir));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".alzassist")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.reasoner.temperature) {
            return Err(ConfigError::ValidationError(
                "reasoner.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.orchestrator.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_iterations must be at least 1".into(),
            ));
        }

        if self.orchestrator.per_tool_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.per_tool_timeout_ms must be > 0".into(),
            ));
        }

        if !self.corpus.corpora.contains_key(&self.corpus.default_corpus) {
            return Err(ConfigError::ValidationError(format!(
                "corpus.default_corpus '{}' is not listed in corpus.corpora",
                self.corpus.default_corpus
            )));
        }

        if self.external_literature.max_results == 0
            || self.external_literature.max_results > MAX_EXTERNAL_RESULTS
        {
            return Err(ConfigError::ValidationError(format!(
                "external_literature.max_results must be between 1 and {MAX_EXTERNAL_RESULTS}"
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.reasoner.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
