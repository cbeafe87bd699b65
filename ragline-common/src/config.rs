//! Configuration management for ragline services.
//!
//! Both services share one configuration file at `~/.ragline/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! ## Network
//! - `RAGLINE_BIND_ADDRESS` → network.bind
//! - `RAGLINE_CHAT_PORT` → services.chat.port
//! - `WRAPPER_PORT` → services.wrapper.port
//!
//! ## Collaborators
//! - `LIGHTRAG_URL` → lightrag.url
//! - `LIGHTRAG_STREAM_URL` → lightrag.stream_url
//! - `LIGHTRAG_API_KEY` → lightrag.api_key
//! - `WRAPPER_TIMEOUT` → lightrag.timeout_secs
//! - `OPENAI_API_KEY` → llm.api_key
//!
//! ## Behaviour
//! - `WRAPPER_API_KEY` → wrapper.api_key
//! - `RAGLINE_MAX_FOLLOW_UPS` → conversation.max_follow_ups
//! - `RAGLINE_SESSION_STORE` → conversation.store_path
//! - `RAGLINE_LOG_LEVEL` → observability.log_level

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".ragline"),
        |dirs| dirs.home_dir().join(".ragline"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network Configuration
// ============================================================================

/// Global network configuration.
///
/// Default bind is `127.0.0.1`; set `0.0.0.0` to expose the services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

/// Per-service port configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServicesConfig {
    /// Conversation service (`/chat`, `/reset`)
    #[serde(default)]
    pub chat: ServicePortConfig,

    /// OpenAI-compatible wrapper (`/chat/completions`)
    #[serde(default)]
    pub wrapper: ServicePortConfig,
}

/// Individual service port configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServicePortConfig {
    #[serde(default)]
    pub port: Option<u16>,
}

// ============================================================================
// Collaborators
// ============================================================================

/// LightRAG retrieval server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightRagConfig {
    /// Query endpoint, e.g. `http://localhost:9621/query`
    #[serde(default = "default_lightrag_url")]
    pub url: String,

    /// Streaming query endpoint. Defaults to `<url>/stream`.
    #[serde(default)]
    pub stream_url: Option<String>,

    /// Sent as `X-API-Key` when set.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Timeout for answer queries.
    #[serde(default = "default_answer_timeout")]
    pub timeout_secs: u64,

    /// Timeout for short bypass-mode calls (verdicts, follow-up questions).
    #[serde(default = "default_decision_timeout")]
    pub decision_timeout_secs: u64,
}

impl Default for LightRagConfig {
    fn default() -> Self {
        Self {
            url: default_lightrag_url(),
            stream_url: None,
            api_key: None,
            timeout_secs: default_answer_timeout(),
            decision_timeout_secs: default_decision_timeout(),
        }
    }
}

impl LightRagConfig {
    /// Effective streaming endpoint.
    pub fn stream_url(&self) -> String {
        self.stream_url
            .clone()
            .unwrap_or_else(|| format!("{}/stream", self.url.trim_end_matches('/')))
    }
}

fn default_lightrag_url() -> String {
    "http://localhost:9621/query".into()
}

fn default_answer_timeout() -> u64 {
    60
}

fn default_decision_timeout() -> u64 {
    30
}

/// Which service answers the short "language" prompts (follow-up verdicts and
/// follow-up questions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// LightRAG in `bypass` mode, forwarding to its own LLM binding.
    #[default]
    Lightrag,
    /// OpenAI chat completions, called directly.
    Openai,
}

/// Language collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_answer_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            api_key: None,
            base_url: default_openai_base_url(),
            model: default_model(),
            timeout_secs: default_answer_timeout(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

// ============================================================================
// Conversation
// ============================================================================

/// Conversation service behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Clarifying questions allowed per session before a final answer is forced.
    #[serde(default = "default_max_follow_ups")]
    pub max_follow_ups: u32,

    /// Idle time after which a session is evicted.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// JSON snapshot of all sessions. `None` keeps sessions in memory only.
    #[serde(default = "default_store_path")]
    pub store_path: Option<String>,

    /// Upper bound for one `/chat` request, collaborator calls included.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub rules: RulesConfig,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_follow_ups: default_max_follow_ups(),
            session_timeout_secs: default_session_timeout(),
            store_path: default_store_path(),
            request_timeout_secs: default_request_timeout(),
            rules: RulesConfig::default(),
        }
    }
}

impl ConversationConfig {
    /// Session store path with `~` and environment variables expanded.
    pub fn resolved_store_path(&self) -> Option<PathBuf> {
        self.store_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| {
                let expanded = shellexpand::full(p).map_or_else(|_| p.to_string(), |s| s.into_owned());
                PathBuf::from(expanded)
            })
    }
}

fn default_max_follow_ups() -> u32 {
    2
}

fn default_session_timeout() -> u64 {
    1800
}

fn default_store_path() -> Option<String> {
    Some("~/.ragline/session_store.json".into())
}

fn default_request_timeout() -> u64 {
    120
}

/// Keyword rules that route a question straight to a final answer.
///
/// All matching is case-insensitive substring matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Question phrasings asking about a known product.
    #[serde(default = "default_knowledge_keywords")]
    pub knowledge_keywords: Vec<String>,

    /// Known product names; a knowledge question must mention one.
    #[serde(default = "default_products")]
    pub products: Vec<String>,

    #[serde(default = "default_program_keywords")]
    pub program_keywords: Vec<String>,

    #[serde(default = "default_logistics_keywords")]
    pub logistics_keywords: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            knowledge_keywords: default_knowledge_keywords(),
            products: default_products(),
            program_keywords: default_program_keywords(),
            logistics_keywords: default_logistics_keywords(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn default_knowledge_keywords() -> Vec<String> {
    strings(&[
        "what is",
        "explain",
        "tell me",
        "usage",
        "how is it used",
        "dosage",
        "benefits",
        "features",
    ])
}

fn default_products() -> Vec<String> {
    strings(&[
        "aadhaar gold",
        "poshak",
        "invictus",
        "zn-factor",
        "biofactor",
        "farmvaidya",
    ])
}

fn default_program_keywords() -> Vec<String> {
    strings(&[
        "fee",
        "fees",
        "cost",
        "price",
        "timing",
        "duration",
        "schedule",
        "program",
        "course",
        "training",
        "workshop",
        "certification",
        "ai in agriculture",
    ])
}

fn default_logistics_keywords() -> Vec<String> {
    strings(&[
        "link",
        "register",
        "registration",
        "join",
        "zoom",
        "session link",
        "contact",
        "phone",
        "number",
        "how to join",
        "where to register",
    ])
}

// ============================================================================
// Wrapper
// ============================================================================

/// OpenAI-compatible wrapper behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapperConfig {
    /// Required `X-API-Key` value. Unset disables wrapper auth.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Words per emitted stream chunk.
    #[serde(default = "default_words_per_chunk")]
    pub words_per_chunk: usize,

    /// Pause between chunks when emulating a stream from a full answer.
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            words_per_chunk: default_words_per_chunk(),
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

fn default_words_per_chunk() -> usize {
    6
}

fn default_chunk_delay_ms() -> u64 {
    20
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Extra module targets pinned to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
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
// Root
// ============================================================================

/// Root configuration structure for all ragline services.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub lightrag: LightRagConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub conversation: ConversationConfig,

    #[serde(default)]
    pub wrapper: WrapperConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
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
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = var("RAGLINE_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Some(port) = var("RAGLINE_CHAT_PORT").and_then(|p| p.parse().ok()) {
            self.services.chat.port = Some(port);
        }
        if let Some(port) = var("WRAPPER_PORT").and_then(|p| p.parse().ok()) {
            self.services.wrapper.port = Some(port);
        }

        if let Some(url) = var("LIGHTRAG_URL") {
            self.lightrag.url = url;
        }
        if let Some(url) = var("LIGHTRAG_STREAM_URL") {
            self.lightrag.stream_url = Some(url);
        }
        if let Some(key) = var("LIGHTRAG_API_KEY").filter(|k| !k.is_empty()) {
            self.lightrag.api_key = Some(key);
        }
        if let Some(secs) = var("WRAPPER_TIMEOUT").and_then(|s| s.parse().ok()) {
            self.lightrag.timeout_secs = secs;
        }
        if let Some(key) = var("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.llm.api_key = Some(key);
        }

        if let Some(key) = var("WRAPPER_API_KEY").filter(|k| !k.is_empty()) {
            self.wrapper.api_key = Some(key);
        }
        if let Some(max) = var("RAGLINE_MAX_FOLLOW_UPS").and_then(|m| m.parse().ok()) {
            self.conversation.max_follow_ups = max;
        }
        if let Some(path) = var("RAGLINE_SESSION_STORE") {
            self.conversation.store_path = Some(path);
        }
        if let Some(level) = var("RAGLINE_LOG_LEVEL") {
            self.observability.log_level = level;
        }
    }

    pub fn bind_address(&self) -> &str {
        &self.network.bind
    }

    pub fn chat_port(&self) -> u16 {
        self.services.chat.port.unwrap_or(8000)
    }

    pub fn wrapper_port(&self) -> u16 {
        self.services.wrapper.port.unwrap_or(8080)
    }
}
