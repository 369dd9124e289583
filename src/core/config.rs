//! Configuration management for planexec
//!
//! Supports environment variables, config files, and runtime overrides.
//! Planner, executor and assessor models are configured independently.
//!
//! Config file location: ~/.config/planexec/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::core::error::{PlanexecError, Result};

/// Main configuration for planexec
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ollama configuration
    pub ollama: OllamaConfig,
    /// Model configuration
    pub models: ModelConfig,
    /// Control loop configuration
    pub agent: AgentConfig,
    /// Retry policy for planner and assessor calls
    #[serde(default)]
    pub retry: RetryConfig,
    /// Search tool configuration
    #[serde(default)]
    pub search: SearchConfig,
    /// Workflow store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Ollama server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Host address (default: localhost)
    pub host: String,
    /// Port number (default: 11434)
    pub port: u16,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Model configuration, one model per role
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model used to produce and revise plans
    pub planner: String,
    /// Model driving the tool-using step executor
    pub executor: String,
    /// Model judging whether the objective is satisfied
    pub assessor: String,
}

/// Control loop limits and behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum replanning transitions before forced termination
    /// Default: 3
    pub max_replans: usize,
    /// Maximum executed steps across the whole run
    /// Default: 25
    pub max_steps: usize,
    /// Iteration cap of the per-step reasoning/acting loop
    /// Default: 6
    pub max_agent_iterations: usize,
    /// Run one assessment when the initial plan comes back empty
    pub assess_empty_plan: bool,
    /// Timeout for a single planner, executor or assessor call
    pub call_timeout_secs: u64,
    /// Wall-clock budget for a whole run
    pub run_timeout_secs: u64,
    /// Whether to show debug output
    pub debug: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_replans: env_parse("PLANEXEC_MAX_REPLANS").unwrap_or(3),
            max_steps: 25,
            max_agent_iterations: 6,
            assess_empty_plan: true,
            call_timeout_secs: 180,
            run_timeout_secs: 900,
            debug: env_flag("PLANEXEC_DEBUG").unwrap_or(false),
        }
    }
}

/// Retry policy for planner and assessor calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Additional attempts after the first failure (0 disables retries)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff_ms: u64,
    /// Upper bound for the delay between retries
    pub max_backoff_ms: u64,
    /// Growth factor applied to the delay after each retry
    pub backoff_multiplier: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Web search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Search API endpoint
    pub endpoint: String,
    /// API key (default: $TAVILY_API_KEY)
    #[serde(default = "default_api_key", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Results returned per query
    pub max_results: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.tavily.com/search".to_string(),
            api_key: default_api_key(),
            max_results: 5,
            timeout_secs: 30,
        }
    }
}

/// Workflow store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding workflows.json
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let data_dir = env::var("PLANEXEC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("planexec")
            });
        Self { data_dir }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env_parse("OLLAMA_PORT").unwrap_or(11434),
            timeout_secs: 120,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            planner: env::var("PLANEXEC_PLANNER_MODEL").unwrap_or_else(|_| "qwen3:8b".to_string()),
            executor: env::var("PLANEXEC_EXECUTOR_MODEL")
                .unwrap_or_else(|_| "qwen3:8b".to_string()),
            assessor: env::var("PLANEXEC_ASSESSOR_MODEL")
                .unwrap_or_else(|_| "qwen3:8b".to_string()),
        }
    }
}

fn default_api_key() -> Option<String> {
    env::var("TAVILY_API_KEY").ok().filter(|k| !k.is_empty())
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key).ok().map(|v| v == "true" || v == "1")
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("planexec")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: CLI args > config file > env vars > defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        match Self::load_from_file() {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Load configuration from file only
    pub fn load_from_file() -> Result<Self> {
        let config_path = Self::config_file();

        if !config_path.exists() {
            return Err(PlanexecError::config("Config file not found"));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| PlanexecError::config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PlanexecError::config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|e| {
                PlanexecError::config(format!("Failed to create config dir: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PlanexecError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| PlanexecError::config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Save configuration and return the path
    pub fn save_and_get_path(&self) -> Result<PathBuf> {
        self.save()?;
        Ok(Self::config_file())
    }

    /// Get the full Ollama API URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }

    /// Path of the workflow document file
    pub fn workflows_file(&self) -> PathBuf {
        self.store.data_dir.join("workflows.json")
    }

    /// Use one model for every role
    pub fn set_all_models(&mut self, model: impl Into<String>) {
        let model = model.into();
        self.models.planner = model.clone();
        self.models.executor = model.clone();
        self.models.assessor = model;
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let config = Config::default();
        assert_eq!(config.agent.max_steps, 25);
        assert_eq!(config.agent.max_agent_iterations, 6);
        assert!(config.agent.assess_empty_plan);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.search.max_results, 5);
    }

    #[test]
    fn test_ollama_url() {
        let mut config = Config::default();
        config.ollama.host = "localhost".to_string();
        config.ollama.port = 11434;
        assert_eq!(config.ollama_url(), "http://localhost:11434");
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut config = Config::default();
        config.agent.max_replans = 7;
        config.set_all_models("llama3.1:8b");

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("planner"));
        assert!(toml_str.contains("assessor"));

        let parsed = Config::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.agent.max_replans, 7);
        assert_eq!(parsed.models.executor, "llama3.1:8b");
    }

    #[test]
    fn test_search_section_without_key_falls_back_to_env() {
        env::set_var("TAVILY_API_KEY", "tvly-from-env");
        let toml_str = r#"
            [search]
            endpoint = "https://api.tavily.com/search"
            max_results = 3
            timeout_secs = 10
        "#;
        let config = Config::from_toml(toml_str).unwrap();
        assert_eq!(config.search.api_key.as_deref(), Some("tvly-from-env"));
        assert_eq!(config.search.max_results, 3);

        let with_key = toml_str.replace("max_results = 3", "max_results = 3\napi_key = \"tvly-file\"");
        let config = Config::from_toml(&with_key).unwrap();
        assert_eq!(config.search.api_key.as_deref(), Some("tvly-file"));
    }

    #[test]
    fn test_missing_optional_sections_use_defaults() {
        let toml_str = r#"
[ollama]
host = "gpu-box"
port = 11434
timeout_secs = 60

[models]
planner = "a"
executor = "b"
assessor = "c"

[agent]
max_replans = 1
max_steps = 5
max_agent_iterations = 2
assess_empty_plan = false
call_timeout_secs = 10
run_timeout_secs = 60
debug = false
"#;
        let config = Config::from_toml(toml_str).unwrap();
        assert_eq!(config.ollama.host, "gpu-box");
        assert_eq!(config.retry.backoff_multiplier, 2.0);
        assert_eq!(config.search.endpoint, "https://api.tavily.com/search");
    }

    #[test]
    fn test_config_dir() {
        let dir = Config::config_dir();
        assert!(dir.to_string_lossy().contains("planexec"));
    }
}
