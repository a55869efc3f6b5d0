use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tournament_engine::EngineConfig;

/// OpenAI-compatible chat-completions endpoint used for generation and review.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL ending before `/chat/completions`, e.g. `http://localhost:8000/v1`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Sampling temperature for concept generation. Reviews use `review_temperature`.
    pub temperature: f32,
    pub review_temperature: f32,
    pub max_tokens: u32,
    /// HTTP client timeout. The engine's per-call timeout still applies on top.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".into(),
            api_key: None,
            model: "gpt-4o-mini".into(),
            temperature: 0.8,
            review_temperature: 0.2,
            max_tokens: 2048,
            request_timeout_secs: 180,
        }
    }
}

impl LlmConfig {
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Top-level server configuration.
///
/// Loaded from an optional TOML file, then overridden by `CONCEPT_*`
/// environment variables, then by command-line flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,
    /// JSON snapshot of the idea store. In-memory only when unset.
    pub state_path: Option<PathBuf>,
    /// CORS origins. Any origin when empty.
    pub allowed_origins: Vec<String>,
    pub llm: LlmConfig,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".into(),
            state_path: None,
            allowed_origins: Vec::new(),
            llm: LlmConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `path` (if given) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml_str(&text)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid TOML")
    }

    /// Apply `CONCEPT_*` overrides looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = var("CONCEPT_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(key) = var("CONCEPT_LLM_API_KEY").filter(|k| !k.is_empty()) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = var("CONCEPT_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(bind) = var("CONCEPT_BIND") {
            self.bind = bind;
        }
        if let Some(path) = var("CONCEPT_STATE_PATH") {
            self.state_path = Some(PathBuf::from(path));
        }
        if let Some(calls) = var("CONCEPT_MAX_CONCURRENT_CALLS") {
            self.engine.max_concurrent_calls = calls
                .parse()
                .with_context(|| format!("CONCEPT_MAX_CONCURRENT_CALLS is not a number: {calls}"))?;
        }
        Ok(())
    }

    /// Check everything the engine and HTTP client will rely on.
    pub fn validate(&self) -> Result<()> {
        self.engine
            .validate()
            .context("Invalid engine configuration")?;
        anyhow::ensure!(!self.llm.model.trim().is_empty(), "llm.model must not be empty");
        anyhow::ensure!(
            self.llm.base_url.starts_with("http://") || self.llm.base_url.starts_with("https://"),
            "llm.base_url must be an http(s) URL, got {}",
            self.llm.base_url
        );
        Ok(())
    }
}
