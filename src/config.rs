//! Configuration types and loading

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Consensus algorithms accepted by validation
pub const VALID_ALGORITHMS: &[&str] = &["majority", "score_top1", "embedding_cluster", "referee"];

/// Main quorum configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Named LLM providers
    pub providers: HashMap<String, ProviderSettings>,

    /// Workers that answer the prompt
    pub workers: Vec<WorkerConfig>,

    /// Judges that score worker answers
    pub judges: Vec<JudgeConfig>,

    /// Consensus algorithm configuration
    pub consensus: ConsensusConfig,

    /// Response cache configuration (placeholder, not wired up)
    pub cache: CacheConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// IDE integration configuration
    pub ide: IdeConfig,
}

/// Configuration for one LLM provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Provider kind: openai, anthropic, ollama
    pub kind: String,

    /// Model identifier (gpt-4o-mini, claude-3-haiku, ...)
    pub model: String,

    /// API endpoint override
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Host, for ollama
    pub host: String,

    /// API key; normally injected from the environment
    #[serde(rename = "api-key")]
    pub api_key: String,
}

/// A configured LLM worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub id: String,

    /// Name of the provider this worker uses
    pub provider: String,

    pub temperature: f64,

    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    #[serde(rename = "system-prompt")]
    pub system_prompt: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            provider: String::new(),
            temperature: 0.7,
            max_tokens: 2048,
            system_prompt: String::new(),
        }
    }
}

/// A model persona that scores worker responses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    pub id: String,

    /// Name of the provider this judge uses
    pub provider: String,

    #[serde(rename = "system-prompt")]
    pub system_prompt: String,
}

/// How to reach consensus among workers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// majority, score_top1, embedding_cluster, referee
    pub algorithm: String,

    /// Minimum winning average score for score_top1
    #[serde(rename = "min-score")]
    pub min_score: f64,

    /// Deadline for the whole run, workers and judges included
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl ConsensusConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            algorithm: "majority".to_string(),
            min_score: 0.0,
            timeout_secs: 30,
        }
    }
}

/// Cache configuration
///
/// Accepted for config-file compatibility; response caching is not
/// implemented and these fields are never read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: Option<PathBuf>,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            enabled: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// IDE integration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdeConfig {
    pub enable: bool,

    /// websocket or stdio
    pub transport: String,

    /// auto, vscode, or disabled
    #[serde(rename = "diff-tool")]
    pub diff_tool: String,

    /// Port override; 0 derives the port from the workspace path
    pub port: u16,
}

impl Default for IdeConfig {
    fn default() -> Self {
        Self {
            enable: false,
            transport: "websocket".to_string(),
            diff_tool: "auto".to_string(),
            port: 0,
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// Explicit `--config` path, then `quorum.yml` in the current directory,
    /// then `<config dir>/quorum/quorum.yml`. Unlike tools that can run on
    /// defaults, quorum needs providers and workers, so no config is an error.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from("quorum.yml");
        if local_config.exists() {
            return Self::load_from_file(&local_config)
                .context(format!("Failed to load config from {}", local_config.display()));
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("quorum").join("quorum.yml");
            if user_config.exists() {
                return Self::load_from_file(&user_config)
                    .context(format!("Failed to load config from {}", user_config.display()));
            }
        }

        Err(eyre!(
            "no config file found; create quorum.yml in the current directory or in the user config directory"
        ))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let mut config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        config.inject_api_keys();

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Validate configuration before use
    ///
    /// Fails fast with a clear message rather than surfacing a confusing
    /// provider error mid-run.
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(eyre!("at least one provider must be configured"));
        }

        if self.workers.is_empty() {
            return Err(eyre!("at least one worker must be configured"));
        }

        let mut seen_ids = HashSet::new();
        for worker in &self.workers {
            if worker.id.is_empty() {
                return Err(eyre!("worker ID cannot be empty"));
            }
            if !seen_ids.insert(worker.id.as_str()) {
                return Err(eyre!("duplicate worker ID: {}", worker.id));
            }
            if worker.provider.is_empty() {
                return Err(eyre!("worker {} must specify a provider", worker.id));
            }
            if !self.providers.contains_key(&worker.provider) {
                return Err(eyre!(
                    "worker {} references unknown provider {}",
                    worker.id,
                    worker.provider
                ));
            }
            if !(0.0..=2.0).contains(&worker.temperature) {
                return Err(eyre!("worker {} temperature must be between 0 and 2", worker.id));
            }
        }

        for judge in &self.judges {
            if judge.id.is_empty() {
                return Err(eyre!("judge ID cannot be empty"));
            }
            if judge.provider.is_empty() {
                return Err(eyre!("judge {} must specify a provider", judge.id));
            }
            if !self.providers.contains_key(&judge.provider) {
                return Err(eyre!("judge {} references unknown provider {}", judge.id, judge.provider));
            }
        }

        for (name, provider) in &self.providers {
            if provider.kind.is_empty() {
                return Err(eyre!("provider {name} must specify a kind"));
            }
            if provider.model.is_empty() {
                return Err(eyre!("provider {name} must specify a model"));
            }
            match provider.kind.as_str() {
                "openai" | "anthropic" => {}
                "ollama" => {
                    if provider.host.is_empty() {
                        return Err(eyre!("provider {name} of kind ollama must specify host"));
                    }
                }
                other => return Err(eyre!("unsupported provider kind: {other}")),
            }
        }

        if !VALID_ALGORITHMS.contains(&self.consensus.algorithm.as_str()) {
            return Err(eyre!(
                "invalid consensus algorithm: {} (valid: {})",
                self.consensus.algorithm,
                VALID_ALGORITHMS.join(", ")
            ));
        }

        Ok(())
    }

    /// Populate API keys from environment variables, by provider kind
    fn inject_api_keys(&mut self) {
        for provider in self.providers.values_mut() {
            let var = match provider.kind.as_str() {
                "openai" => "OPENAI_API_KEY",
                "anthropic" => "ANTHROPIC_API_KEY",
                _ => continue,
            };
            if let Ok(key) = std::env::var(var)
                && !key.is_empty()
            {
                provider.api_key = key;
            }
        }
    }
}
