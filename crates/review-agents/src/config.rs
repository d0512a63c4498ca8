use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use coordination::debate::{FINAL_RESULTS_FILE, PARTIAL_RESULTS_FILE, RESULTS_TABLE_FILE};
use coordination::{AgentIdentity, OrchestratorConfig, Persona};
use serde::{Deserialize, Serialize};

/// OpenAI-compatible endpoint; OpenRouter unless overridden.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Primary API key variable.
pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Older name, read when the primary is unset.
pub const API_KEY_FALLBACK_ENV: &str = "OPENROUTER_KEY";

/// Endpoint override.
pub const BASE_URL_ENV: &str = "OPENROUTER_BASE_URL";

/// Model-completion provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Never written back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// HTTP client timeout per request.
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            request_timeout_secs: 120,
        }
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// One reviewer on the panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub model: String,
    pub name: String,
    #[serde(default)]
    pub persona: Persona,
    /// Literal system prompt; wins over `persona` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl AgentConfig {
    pub fn new(model: &str, name: &str) -> Self {
        Self {
            model: model.to_string(),
            name: name.to_string(),
            persona: Persona::Standard,
            system_prompt: None,
        }
    }

    pub fn identity(&self) -> AgentIdentity {
        let identity = AgentIdentity::new(&self.model, &self.name).with_persona(self.persona);
        match &self.system_prompt {
            Some(prompt) => identity.with_system_prompt(prompt),
            None => identity,
        }
    }
}

/// Batch run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Corpus root holding `ratings_subset.tsv` and `iclr_parsed/`.
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Papers to process; `None` means all matched papers.
    pub limit: Option<usize>,
    /// Text cap in approximate tokens (4 chars each).
    pub max_tokens: usize,
    pub temperature: f32,
    pub max_parallel_papers: usize,
    pub parallel_agents: bool,
    /// Upper bound on one model call before it falls back.
    pub call_timeout_secs: u64,
    /// Seed the run from the partial-results checkpoint.
    pub resume: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("datasets/AI-Scientist-ICLR"),
            output_dir: PathBuf::from("results"),
            limit: Some(10),
            max_tokens: 15_000,
            temperature: 0.7,
            max_parallel_papers: 1,
            parallel_agents: true,
            call_timeout_secs: 180,
            resume: false,
        }
    }
}

impl RunConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.output_dir.join(PARTIAL_RESULTS_FILE)
    }

    pub fn results_path(&self) -> PathBuf {
        self.output_dir.join(FINAL_RESULTS_FILE)
    }

    pub fn table_path(&self) -> PathBuf {
        self.output_dir.join(RESULTS_TABLE_FILE)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_parallel_papers: self.max_parallel_papers,
            parallel_agents: self.parallel_agents,
            checkpoint_path: Some(self.checkpoint_path()),
        }
    }
}

/// Top-level panel configuration.
///
/// Layered: defaults, then an optional TOML file, then environment, then
/// CLI flags (applied by the binary).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    pub provider: ProviderConfig,
    /// Panel in configuration order; this order keys every result map.
    pub agents: Vec<AgentConfig>,
    pub run: RunConfig,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            agents: default_panel(),
            run: RunConfig::default(),
        }
    }
}

/// GPT-4o, Claude 3.5 Sonnet, GPT-4o-mini.
pub fn default_panel() -> Vec<AgentConfig> {
    vec![
        AgentConfig::new("openai/gpt-4o", "GPT-4o"),
        AgentConfig::new("anthropic/claude-3.5-sonnet", "Claude-3.5"),
        AgentConfig::new("openai/gpt-4o-mini", "GPT-4o-mini"),
    ]
}

impl PanelConfig {
    /// Defaults (or `path` when given), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml_str(&text)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse TOML")
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Environment overrides through an injectable lookup.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty(API_KEY_ENV).or_else(|| non_empty(API_KEY_FALLBACK_ENV)) {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = non_empty(BASE_URL_ENV) {
            self.provider.base_url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.agents.is_empty() {
            bail!("At least one agent must be configured");
        }
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                bail!("Agent for model {} has an empty name", agent.model);
            }
            if agent.model.trim().is_empty() {
                bail!("Agent {} has an empty model reference", agent.name);
            }
            if !seen.insert(agent.name.as_str()) {
                bail!("Duplicate agent name: {}", agent.name);
            }
        }
        if !(0.0..=2.0).contains(&self.run.temperature) {
            bail!(
                "Temperature must be within [0, 2], got {}",
                self.run.temperature
            );
        }
        if self.run.max_parallel_papers == 0 {
            bail!("max_parallel_papers must be at least 1");
        }
        if self.run.max_tokens == 0 {
            bail!("max_tokens must be at least 1");
        }
        Ok(())
    }

    pub fn identities(&self) -> Vec<AgentIdentity> {
        self.agents.iter().map(AgentConfig::identity).collect()
    }
}
