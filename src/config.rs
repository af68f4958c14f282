//! Evaluation configuration.
//!
//! A single YAML file describes the agents that can be evaluated, the judge
//! models that can score them, and how the judge and delivery pipeline are
//! tuned. Every section is optional; missing values fall back to defaults.
//!
//! ```yaml
//! agents:
//!   - id: weather
//!     name: Weather agent
//!     url: http://localhost:8000/agent
//! models:
//!   - id: sonnet
//!     model: anthropic/claude-sonnet-4.5
//! judge:
//!   url: http://localhost:9000/judge
//!   max_retries: 9
//!   base_delay_ms: 1000
//! delivery:
//!   server: http://localhost:8080
//!   poll_interval_secs: 5
//!   poll_timeout_secs: 600
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::delivery::DeliveryConfig;
use crate::error::ConfigError;
use crate::judge::{RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};
use crate::llm::DEFAULT_MODEL;

/// An agent endpoint speaking the AG-UI protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub url: String,
}

impl AgentConfig {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A judge model alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Model name as understood by the LLM proxy.
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeSettings {
    /// HTTP judge service. When unset the judge prompts an LLM directly.
    pub url: Option<String>,
    /// Default judge model id or model name.
    pub model: String,
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            url: None,
            model: DEFAULT_MODEL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
        }
    }
}

/// Connection to a LiteLLM-compatible proxy, used by the LLM judge backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// Base URL of the evaluation server.
    pub server: String,
    pub poll_interval_secs: u64,
    pub poll_timeout_secs: u64,
    pub trace_mode: bool,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        let defaults = DeliveryConfig::default();
        Self {
            server: "http://localhost:8080".to_string(),
            poll_interval_secs: defaults.poll_interval.as_secs(),
            poll_timeout_secs: defaults.poll_timeout.as_secs(),
            trace_mode: defaults.trace_mode,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub agents: Vec<AgentConfig>,
    pub models: Vec<ModelConfig>,
    pub judge: JudgeSettings,
    pub llm: LlmSettings,
    pub delivery: DeliverySettings,
    /// Directory for saved benchmark reports.
    pub reports_dir: PathBuf,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            models: Vec::new(),
            judge: JudgeSettings::default(),
            llm: LlmSettings::default(),
            delivery: DeliverySettings::default(),
            reports_dir: PathBuf::from("./reports"),
        }
    }
}

impl EvalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads and validates a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, otherwise starts from defaults; then applies
    /// environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        let config = config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from the process environment.
    ///
    /// - `AGENT_EVAL_SERVER`: evaluation server base URL
    /// - `AGENT_EVAL_JUDGE_URL`: HTTP judge service URL
    /// - `LITELLM_API_BASE`, `LITELLM_API_KEY`, `LITELLM_DEFAULT_MODEL`
    pub fn apply_env(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(server) = get("AGENT_EVAL_SERVER") {
            self.delivery.server = server;
        }
        if let Some(url) = get("AGENT_EVAL_JUDGE_URL") {
            self.judge.url = Some(url);
        }
        if let Some(base) = get("LITELLM_API_BASE") {
            self.llm.api_base = Some(base);
        }
        if let Some(key) = get("LITELLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = get("LITELLM_DEFAULT_MODEL") {
            self.llm.default_model = Some(model);
        }
        self
    }

    pub fn with_agent(mut self, agent: AgentConfig) -> Self {
        self.agents.retain(|a| a.id != agent.id);
        self.agents.push(agent);
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.models.retain(|m| m.id != model.id);
        self.models.push(model);
        self
    }

    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.delivery.server = server.into();
        self
    }

    pub fn with_judge_url(mut self, url: impl Into<String>) -> Self {
        self.judge.url = Some(url.into());
        self
    }

    pub fn with_trace_mode(mut self, trace_mode: bool) -> Self {
        self.delivery.trace_mode = trace_mode;
        self
    }

    pub fn with_reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = dir.into();
        self
    }

    /// Looks up a registered agent.
    pub fn agent(&self, id: &str) -> Result<&AgentConfig, ConfigError> {
        self.agents
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| ConfigError::UnknownAgent(id.to_string()))
    }

    /// Resolves a judge model alias to the proxy model name. Unregistered
    /// names pass through unchanged.
    pub fn resolve_model<'a>(&'a self, id: &'a str) -> &'a str {
        self.models
            .iter()
            .find(|m| m.id == id)
            .map(|m| m.model.as_str())
            .unwrap_or(id)
    }

    /// The configured default judge model, alias resolved.
    pub fn judge_model(&self) -> &str {
        self.resolve_model(&self.judge.model)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.judge.max_retries,
            Duration::from_millis(self.judge.base_delay_ms),
        )
    }

    pub fn delivery_config(&self) -> DeliveryConfig {
        DeliveryConfig {
            poll_interval: Duration::from_secs(self.delivery.poll_interval_secs),
            poll_timeout: Duration::from_secs(self.delivery.poll_timeout_secs),
            trace_mode: self.delivery.trace_mode,
        }
    }

    /// Checks values that would otherwise fail at run time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delivery.server.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "delivery.server cannot be empty".to_string(),
            ));
        }
        if self.delivery.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "delivery.poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.delivery.poll_timeout_secs < self.delivery.poll_interval_secs {
            return Err(ConfigError::Invalid(
                "delivery.poll_timeout_secs must be at least poll_interval_secs".to_string(),
            ));
        }
        if self.judge.model.trim().is_empty() {
            return Err(ConfigError::Invalid("judge.model cannot be empty".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if agent.id.is_empty() || agent.url.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "agent '{}' needs both an id and a url",
                    agent.id
                )));
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate agent id '{}'",
                    agent.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"
agents:
  - id: weather
    name: Weather agent
    url: http://localhost:8000/agent
  - id: echo
    url: http://localhost:8001/agent
models:
  - id: sonnet
    model: anthropic/claude-sonnet-4.5
judge:
  model: sonnet
  max_retries: 3
  base_delay_ms: 250
delivery:
  server: http://eval.local
  poll_interval_secs: 2
  poll_timeout_secs: 60
reports_dir: /tmp/reports
"#;

    #[test]
    fn test_defaults() {
        let config = EvalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.delivery_config(), DeliveryConfig::default());
        assert_eq!(config.judge_model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_load_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = EvalConfig::load(file.path()).unwrap();

        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agent("weather").unwrap().display_name(), "Weather agent");
        assert_eq!(config.agent("echo").unwrap().display_name(), "echo");
        assert_eq!(config.judge_model(), "anthropic/claude-sonnet-4.5");
        assert_eq!(
            config.retry_policy(),
            RetryPolicy::new(3, Duration::from_millis(250))
        );
        assert_eq!(config.delivery_config().poll_interval, Duration::from_secs(2));
        assert_eq!(config.reports_dir, PathBuf::from("/tmp/reports"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: EvalConfig = serde_yaml::from_str("delivery:\n  trace_mode: true\n").unwrap();
        assert!(config.delivery.trace_mode);
        assert_eq!(config.delivery.poll_timeout_secs, 600);
        assert_eq!(config.judge.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_unknown_agent() {
        let config = EvalConfig::default();
        let err = config.agent("nope").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAgent(id) if id == "nope"));
    }

    #[test]
    fn test_missing_file() {
        let err = EvalConfig::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_invalid_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"agents: [this is: not valid").unwrap();
        let err = EvalConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("AGENT_EVAL_SERVER", "http://override"),
            ("AGENT_EVAL_JUDGE_URL", "http://judge"),
            ("LITELLM_API_BASE", "http://proxy:4000"),
            ("LITELLM_API_KEY", ""),
        ]
        .into_iter()
        .collect();

        let config =
            EvalConfig::default().apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.delivery.server, "http://override");
        assert_eq!(config.judge.url.as_deref(), Some("http://judge"));
        assert_eq!(config.llm.api_base.as_deref(), Some("http://proxy:4000"));
        assert_eq!(config.llm.api_key, None);
    }

    #[test]
    fn test_validation() {
        let dup = EvalConfig::default()
            .with_agent(AgentConfig {
                id: "a".to_string(),
                name: String::new(),
                url: "http://a".to_string(),
            })
            .with_agent(AgentConfig {
                id: "a".to_string(),
                name: "replaced".to_string(),
                url: "http://a2".to_string(),
            });
        assert_eq!(dup.agents.len(), 1);
        assert_eq!(dup.agent("a").unwrap().url, "http://a2");

        let mut bad = EvalConfig::default();
        bad.delivery.poll_interval_secs = 0;
        assert!(matches!(bad.validate(), Err(ConfigError::Invalid(_))));

        let bad = EvalConfig::default().with_server("  ");
        assert!(bad.validate().is_err());
    }
}
