//! Configuration management for sift.
//!
//! The pipeline reads a single configuration file at `~/.sift/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (SIFT_* prefix, provider API keys)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `SIFT_LOG_LEVEL` → observability.log_level
//! - `SIFT_LOG_FORMAT` → observability.log_format
//! - `SIFT_LLM_MODEL` → llm.model
//! - `SIFT_LLM_BASE_URL` → llm.base_url
//! - `SIFT_LLM_API_KEY` / `OPENAI_API_KEY` → llm.api_key
//! - `SIFT_SNAPSHOT_API_KEY` / `XAI_API_KEY` → snapshot.api_key
//! - `SIFT_SNAPSHOT_TTL_MINUTES` → snapshot.ttl_minutes
//! - `SIFT_BATCH_SIZE` → analysis.batch_size

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".sift"),
        |dirs| dirs.home_dir().join(".sift"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// "json" for structured output, anything else for human-readable
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Classification model
// ============================================================================

/// How the classification call is forced into the result schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Schema description in the prompt, JSON parsed and validated locally
    #[default]
    NativeJson,
    /// Provider-side structured output (`json_schema` response format)
    TypedCall,
}

/// Classification model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL (without `/chat/completions`)
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// API key (prefer env var)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model identifier
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Sampling temperature for classification calls
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Retries after the first enforcement attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Enforcement strategy
    #[serde(default)]
    pub enforcement: EnforcementMode,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: None,
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            enforcement: EnforcementMode::default(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_temperature() -> f64 {
    0.2
}

fn default_max_retries() -> u32 {
    2
}

// ============================================================================
// Market snapshot
// ============================================================================

/// An additional snapshot provider tried after the primary one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondarySnapshotConfig {
    /// Name used in logs
    pub name: String,
    /// OpenAI-compatible API base URL
    pub base_url: String,
    /// API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
}

/// Market snapshot acquisition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Query a live search model at all; when false only cache and fallback are used
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Search-capable model base URL
    #[serde(default = "default_snapshot_base_url")]
    pub base_url: String,
    /// API key (prefer env var)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Search-capable reasoning model
    #[serde(default = "default_snapshot_model")]
    pub model: String,
    /// Sampling temperature for snapshot requests
    #[serde(default = "default_snapshot_temperature")]
    pub temperature: f64,
    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Snapshot freshness window in minutes
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,
    /// Persisted cache file (defaults to `~/.sift/market_snapshot.json`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<PathBuf>,
    /// Serve canned snapshots instead of calling a model
    #[serde(default)]
    pub simulate: bool,
    /// Providers tried in order when the primary fails or is rejected
    #[serde(default)]
    pub secondary: Vec<SecondarySnapshotConfig>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_snapshot_base_url(),
            api_key: None,
            model: default_snapshot_model(),
            temperature: default_snapshot_temperature(),
            timeout_secs: default_llm_timeout(),
            ttl_minutes: default_ttl_minutes(),
            cache_file: None,
            simulate: false,
            secondary: Vec::new(),
        }
    }
}

impl SnapshotConfig {
    /// Effective cache file path.
    pub fn cache_path(&self) -> PathBuf {
        self.cache_file
            .clone()
            .unwrap_or_else(|| config_dir().join("market_snapshot.json"))
    }
}

fn default_true() -> bool {
    true
}

fn default_snapshot_base_url() -> String {
    "https://api.x.ai/v1".into()
}

fn default_snapshot_model() -> String {
    "grok-4".into()
}

fn default_snapshot_temperature() -> f64 {
    0.3
}

fn default_ttl_minutes() -> u64 {
    30
}

// ============================================================================
// Analysis
// ============================================================================

/// Orchestration and taxonomy tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Items per enforcement call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Minimum Jaccard similarity for a category set to count as consistent
    #[serde(default = "default_consistency_threshold")]
    pub consistency_threshold: f64,
    /// Custom classification template (built-in template when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_file: Option<PathBuf>,
    /// Registry export file (defaults to `~/.sift/categories.json`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_file: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            consistency_threshold: default_consistency_threshold(),
            template_file: None,
            registry_file: None,
        }
    }
}

impl AnalysisConfig {
    /// Effective registry file path.
    pub fn registry_path(&self) -> PathBuf {
        self.registry_file
            .clone()
            .unwrap_or_else(|| config_dir().join("categories.json"))
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_consistency_threshold() -> f64 {
    0.8
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Classification model
    #[serde(default)]
    pub llm: LlmConfig,

    /// Market snapshot acquisition
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Batching and taxonomy tracking
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("SIFT_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("SIFT_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(model) = lookup("SIFT_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(url) = lookup("SIFT_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(key) = lookup("SIFT_LLM_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.llm.api_key = Some(key);
        }
        if let Some(key) = lookup("SIFT_SNAPSHOT_API_KEY").or_else(|| lookup("XAI_API_KEY")) {
            self.snapshot.api_key = Some(key);
        }
        if let Some(ttl) = lookup("SIFT_SNAPSHOT_TTL_MINUTES") {
            if let Ok(minutes) = ttl.parse() {
                self.snapshot.ttl_minutes = minutes;
            }
        }
        if let Some(size) = lookup("SIFT_BATCH_SIZE") {
            if let Ok(n) = size.parse() {
                self.analysis.batch_size = n;
            }
        }
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        let dir = config_dir();

        if !dir.exists() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        }

        let path = config_path();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}
