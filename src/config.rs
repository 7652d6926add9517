//! Run configuration.
//!
//! Handles YAML run configuration loading and resolves each configured model
//! into a [`ModelConfig`] carrying its API key. Keys come from the process
//! environment (after `.env` is loaded by the binary), never from the YAML.

use crate::metrics::MarkerLexicon;
use crate::stimuli::{StimulusError, TaskType, Variety};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Missing API key for model {model}: set {env_var}")]
    MissingApiKey { model: String, env_var: String },

    #[error("No models configured")]
    NoModels,

    #[error("Duplicate model name: {0}")]
    DuplicateModel(String),

    #[error("Model {0} selected but not configured")]
    UnknownModel(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// LLM provider behind a model entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    Mistral,
    Cohere,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

impl Provider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Mistral => "mistral",
            Self::Cohere => "cohere",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    /// Environment variable holding the API key by default
    #[must_use]
    pub const fn default_api_key_env(self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::Mistral => "MISTRAL_API_KEY",
            Self::Cohere => "COHERE_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    /// Provider model used when the entry does not name one
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.5-flash",
            Self::Mistral => "mistral-large-latest",
            Self::Cohere => "command-r-plus-08-2024",
            Self::OpenAi => "gpt-4",
            Self::Anthropic => "claude-3-sonnet-20240229",
        }
    }

    /// Decoding defaults: (temperature, max tokens)
    #[must_use]
    pub const fn default_decoding(self) -> (Option<f32>, Option<u32>) {
        match self {
            Self::Gemini => (Some(0.7), Some(2048)),
            Self::Mistral => (Some(0.3), Some(200)),
            Self::Anthropic => (None, Some(1024)),
            Self::Cohere | Self::OpenAi => (None, None),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "mistral" => Ok(Self::Mistral),
            "cohere" => Ok(Self::Cohere),
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            _ => Err(ConfigError::UnknownProvider(s.to_string())),
        }
    }
}

/// Resolved per-model configuration handed to adapters.
///
/// Adapters read it and never mutate it.
#[derive(Clone, PartialEq)]
pub struct ModelConfig {
    /// Run label, unique within a run (e.g., `gemini`, `mistral-small`)
    pub name: String,
    pub provider: Provider,
    /// Provider model identifier
    pub model: String,
    pub api_key: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    /// Override of the provider's API base URL
    pub base_url: Option<String>,
}

impl ModelConfig {
    /// Config with provider defaults for everything but the key
    #[must_use]
    pub fn new(name: &str, provider: Provider, api_key: &str) -> Self {
        let (temperature, max_tokens) = provider.default_decoding();
        let (top_p, top_k) = match provider {
            Provider::Gemini => (Some(0.8), Some(40)),
            _ => (None, None),
        };
        Self {
            name: name.to_string(),
            provider,
            model: provider.default_model().to_string(),
            api_key: api_key.to_string(),
            temperature,
            max_tokens,
            top_p,
            top_k,
            base_url: None,
        }
    }
}

// Keeps API keys out of logs
impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("top_p", &self.top_p)
            .field("top_k", &self.top_k)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Model entry as written in the YAML file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: Provider,
    #[serde(default)]
    pub model: Option<String>,
    /// Environment variable holding the key (default `<PROVIDER>_API_KEY`)
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ModelSpec {
    /// Resolve the entry into a [`ModelConfig`], looking the key up with `lookup`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingApiKey` if the key variable is unset or blank.
    pub fn resolve<F>(&self, lookup: F) -> Result<ModelConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_var = self
            .api_key_env
            .clone()
            .unwrap_or_else(|| self.provider.default_api_key_env().to_string());

        let api_key = lookup(&env_var)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey {
                model: self.name.clone(),
                env_var: env_var.clone(),
            })?;

        let mut config = ModelConfig::new(&self.name, self.provider, &api_key);
        if let Some(model) = &self.model {
            config.model.clone_from(model);
        }
        config.temperature = self.temperature.or(config.temperature);
        config.max_tokens = self.max_tokens.or(config.max_tokens);
        config.top_p = self.top_p.or(config.top_p);
        config.top_k = self.top_k.or(config.top_k);
        config.base_url.clone_from(&self.base_url);
        Ok(config)
    }
}

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// `base_delay * retry_number`
    Linear,
}

/// Retry settings as written in the YAML file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrySettings {
    /// Total attempts for rate-limit and timeout errors
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Total attempts for provider errors
    #[serde(default = "default_provider_error_attempts")]
    pub provider_error_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff: Backoff,
}

const fn default_max_attempts() -> u32 {
    3
}
const fn default_provider_error_attempts() -> u32 {
    2
}
const fn default_base_delay_ms() -> u64 {
    1000
}
const fn default_backoff() -> Backoff {
    Backoff::Linear
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            provider_error_attempts: default_provider_error_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff: default_backoff(),
        }
    }
}

/// HTTP request settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestSettings {
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Pause between consecutive outbound calls in milliseconds
    #[serde(default = "default_pace_ms")]
    pub pace_ms: u64,
}

const fn default_timeout_ms() -> u64 {
    30_000
}
const fn default_pace_ms() -> u64 {
    500
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            pace_ms: default_pace_ms(),
        }
    }
}

impl RequestSettings {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub const fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }
}

/// Prompt templates per task type. Each must contain `{text}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromptTemplates {
    #[serde(default = "default_paraphrase_template")]
    pub paraphrase: String,
    #[serde(default = "default_continue_template")]
    pub r#continue: String,
    #[serde(default = "default_explain_template")]
    pub explain: String,
}

fn default_paraphrase_template() -> String {
    "Paraphrase this text in the same dialectal style. Reply with one sentence only, \
     no lists or explanations: {text}"
        .to_string()
}

fn default_continue_template() -> String {
    "Continue this text in the same dialectal style with one more sentence. \
     Reply with the continuation only: {text}"
        .to_string()
}

fn default_explain_template() -> String {
    "Explain what this text means, answering in the same dialectal style \
     in one or two sentences: {text}"
        .to_string()
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            paraphrase: default_paraphrase_template(),
            r#continue: default_continue_template(),
            explain: default_explain_template(),
        }
    }
}

impl PromptTemplates {
    #[must_use]
    pub fn template(&self, task: TaskType) -> &str {
        match task {
            TaskType::Paraphrase => &self.paraphrase,
            TaskType::Continue => &self.r#continue,
            TaskType::Explain => &self.explain,
        }
    }

    /// Build the prompt for a task from the stimulus text
    #[must_use]
    #[allow(clippy::literal_string_with_formatting_args)]
    pub fn render(&self, task: TaskType, text: &str) -> String {
        self.template(task).replace("{text}", text)
    }
}

/// Complete run configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    /// Models in run order
    pub models: Vec<ModelSpec>,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub request: RequestSettings,
    /// Run every stimulus once per listed task instead of its own task
    #[serde(default)]
    pub task_types: Option<Vec<TaskType>>,
    #[serde(default)]
    pub prompts: PromptTemplates,
    /// Extra markers per variety label, merged into the default lexicon
    #[serde(default)]
    pub extra_markers: BTreeMap<String, Vec<String>>,
}

impl RunConfig {
    /// Load run configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load run configuration from a YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed or fails validation.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check structural invariants
    ///
    /// # Errors
    ///
    /// Returns an error on empty or duplicate models, zero attempt bounds,
    /// empty task type lists, or templates missing `{text}`.
    #[allow(clippy::literal_string_with_formatting_args)]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.models.is_empty() {
            return Err(ConfigError::NoModels);
        }

        let mut names = HashSet::new();
        for model in &self.models {
            if model.name.trim().is_empty() {
                return Err(ConfigError::Invalid("model name must not be empty".into()));
            }
            if !names.insert(model.name.as_str()) {
                return Err(ConfigError::DuplicateModel(model.name.clone()));
            }
        }

        if self.retry.max_attempts == 0 || self.retry.provider_error_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry attempt bounds must be at least 1".into(),
            ));
        }

        if matches!(&self.task_types, Some(tasks) if tasks.is_empty()) {
            return Err(ConfigError::Invalid("task_types must not be empty".into()));
        }

        for task in TaskType::ALL {
            if !self.prompts.template(task).contains("{text}") {
                return Err(ConfigError::Invalid(format!(
                    "prompt template for {task} must contain {{text}}"
                )));
            }
        }

        Ok(())
    }

    /// Resolve the models to run, in configured order.
    ///
    /// `only` restricts the run to the named models (still in configured order).
    ///
    /// # Errors
    ///
    /// Returns an error if a selected name is not configured or a key is missing.
    pub fn resolve_models<F>(
        &self,
        only: &[String],
        lookup: F,
    ) -> Result<Vec<ModelConfig>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for name in only {
            if !self.models.iter().any(|m| &m.name == name) {
                return Err(ConfigError::UnknownModel(name.clone()));
            }
        }

        self.models
            .iter()
            .filter(|m| only.is_empty() || only.contains(&m.name))
            .map(|m| m.resolve(&lookup))
            .collect()
    }

    /// Like [`RunConfig::resolve_models`], but models whose key is missing are
    /// left out instead of failing the run. Returns the runnable models and the
    /// skipped `MissingApiKey` errors.
    ///
    /// # Errors
    ///
    /// Returns an error if a selected name is not configured.
    pub fn resolve_available_models<F>(
        &self,
        only: &[String],
        lookup: F,
    ) -> Result<(Vec<ModelConfig>, Vec<ConfigError>), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for name in only {
            if !self.models.iter().any(|m| &m.name == name) {
                return Err(ConfigError::UnknownModel(name.clone()));
            }
        }

        let mut resolved = Vec::new();
        let mut skipped = Vec::new();
        for spec in self
            .models
            .iter()
            .filter(|m| only.is_empty() || only.contains(&m.name))
        {
            match spec.resolve(&lookup) {
                Ok(model) => resolved.push(model),
                Err(err @ ConfigError::MissingApiKey { .. }) => skipped.push(err),
                Err(err) => return Err(err),
            }
        }
        Ok((resolved, skipped))
    }

    /// Default marker lexicon merged with `extra_markers`
    ///
    /// # Errors
    ///
    /// Returns an error if an `extra_markers` key is not a known variety.
    pub fn marker_lexicon(&self) -> Result<MarkerLexicon, ConfigError> {
        let mut lexicon = MarkerLexicon::default();
        for (label, markers) in &self.extra_markers {
            let variety: Variety = label
                .parse()
                .map_err(|e: StimulusError| ConfigError::Invalid(e.to_string()))?;
            lexicon.extend(variety, markers.iter().cloned());
        }
        Ok(lexicon)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| {
            vars.iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        }
    }

    const FULL_YAML: &str = r#"
models:
  - name: gemini
    provider: gemini
  - name: mistral-small
    provider: mistral
    model: mistral-small-latest
    api_key_env: MY_MISTRAL
    temperature: 0.1
    max_tokens: 64
  - name: cohere
    provider: cohere

retry:
  max_attempts: 4
  base_delay_ms: 250
  backoff: fixed

request:
  timeout_ms: 5000
  pace_ms: 0

task_types: [paraphrase, explain]

prompts:
  explain: "Explain: {text}"
"#;

    #[test]
    fn test_run_config_from_yaml() {
        let config = RunConfig::from_yaml(FULL_YAML).unwrap();
        assert_eq!(config.models.len(), 3);
        assert_eq!(config.models[1].provider, Provider::Mistral);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.provider_error_attempts, 2); // default
        assert_eq!(config.retry.backoff, Backoff::Fixed);
        assert_eq!(config.request.timeout(), Duration::from_secs(5));
        assert_eq!(
            config.task_types,
            Some(vec![TaskType::Paraphrase, TaskType::Explain])
        );
        assert_eq!(config.prompts.explain, "Explain: {text}");
        assert_eq!(config.prompts.paraphrase, default_paraphrase_template());
    }

    #[test]
    fn test_run_config_minimal_defaults() {
        let config = RunConfig::from_yaml("models:\n  - name: g\n    provider: gemini\n").unwrap();
        assert_eq!(config.retry, RetrySettings::default());
        assert_eq!(config.request.pace(), Duration::from_millis(500));
        assert!(config.task_types.is_none());
        assert!(config.extra_markers.is_empty());
    }

    #[test]
    fn test_validate_rejects_no_models() {
        assert!(matches!(
            RunConfig::from_yaml("models: []\n"),
            Err(ConfigError::NoModels)
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let yaml = "models:\n  - name: a\n    provider: gemini\n  - name: a\n    provider: cohere\n";
        assert!(matches!(
            RunConfig::from_yaml(yaml),
            Err(ConfigError::DuplicateModel(name)) if name == "a"
        ));
    }

    #[test]
    fn test_validate_rejects_template_without_placeholder() {
        let yaml = "models:\n  - name: a\n    provider: gemini\nprompts:\n  paraphrase: \"no placeholder\"\n";
        assert!(matches!(
            RunConfig::from_yaml(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let yaml = "models:\n  - name: a\n    provider: gemini\nretry:\n  max_attempts: 0\n";
        assert!(matches!(
            RunConfig::from_yaml(yaml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_unknown_provider_is_yaml_error() {
        let yaml = "models:\n  - name: a\n    provider: llamacorp\n";
        assert!(matches!(
            RunConfig::from_yaml(yaml),
            Err(ConfigError::YamlError(_))
        ));
    }

    #[test]
    fn test_resolve_models_applies_overrides_and_defaults() {
        let config = RunConfig::from_yaml(FULL_YAML).unwrap();
        let lookup = env(&[
            ("GEMINI_API_KEY", " g-key "),
            ("MY_MISTRAL", "m-key"),
            ("COHERE_API_KEY", "c-key"),
        ]);
        let models = config.resolve_models(&[], lookup).unwrap();

        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["gemini", "mistral-small", "cohere"]);

        assert_eq!(models[0].api_key, "g-key");
        assert_eq!(models[0].model, "gemini-2.5-flash");
        assert_eq!(models[0].temperature, Some(0.7));
        assert_eq!(models[0].top_k, Some(40));

        assert_eq!(models[1].model, "mistral-small-latest");
        assert_eq!(models[1].temperature, Some(0.1));
        assert_eq!(models[1].max_tokens, Some(64));
    }

    #[test]
    fn test_resolve_models_filter_keeps_configured_order() {
        let config = RunConfig::from_yaml(FULL_YAML).unwrap();
        let lookup = env(&[("GEMINI_API_KEY", "g"), ("COHERE_API_KEY", "c")]);
        let models = config
            .resolve_models(&["cohere".to_string(), "gemini".to_string()], lookup)
            .unwrap();
        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["gemini", "cohere"]);
    }

    #[test]
    fn test_resolve_models_missing_key() {
        let config = RunConfig::from_yaml(FULL_YAML).unwrap();
        let err = config
            .resolve_models(&["mistral-small".to_string()], env(&[("MY_MISTRAL", "  ")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingApiKey { ref env_var, .. } if env_var == "MY_MISTRAL"
        ));
    }

    #[test]
    fn test_resolve_available_models_skips_missing_keys() {
        let config = RunConfig::from_yaml(FULL_YAML).unwrap();
        let (models, skipped) = config
            .resolve_available_models(
                &[],
                env(&[("GEMINI_API_KEY", "g"), ("COHERE_API_KEY", "c")]),
            )
            .unwrap();

        let names: Vec<_> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["gemini", "cohere"]);
        assert_eq!(skipped.len(), 1);
        assert!(matches!(
            skipped[0],
            ConfigError::MissingApiKey { ref model, ref env_var }
                if model == "mistral-small" && env_var == "MY_MISTRAL"
        ));
        assert!(matches!(
            config.resolve_available_models(&["gpt".to_string()], env(&[])),
            Err(ConfigError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_resolve_models_unknown_selection() {
        let config = RunConfig::from_yaml(FULL_YAML).unwrap();
        assert!(matches!(
            config.resolve_models(&["gpt".to_string()], env(&[])),
            Err(ConfigError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_provider_parsing_and_defaults() {
        assert_eq!("Gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert_eq!("claude".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert!("bard".parse::<Provider>().is_err());
        assert_eq!(Provider::OpenAi.default_api_key_env(), "OPENAI_API_KEY");
        assert_eq!(Provider::Cohere.default_model(), "command-r-plus-08-2024");
    }

    #[test]
    fn test_model_config_debug_redacts_key() {
        let config = ModelConfig::new("gemini", Provider::Gemini, "super-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn test_marker_lexicon_merges_extras() {
        let yaml = "models:\n  - name: a\n    provider: gemini\nextra_markers:\n  stdeng: [kindly, \"do the needful\"]\n  AAVE: [finna]\n";
        let config = RunConfig::from_yaml(yaml).unwrap();
        let lexicon = config.marker_lexicon().unwrap();
        assert_eq!(lexicon.markers_for(Variety::StdEng), ["kindly", "do the needful"]);
        let aave = lexicon.markers_for(Variety::Aave);
        assert_eq!(aave.iter().filter(|m| *m == "finna").count(), 1);
    }

    #[test]
    fn test_marker_lexicon_rejects_unknown_variety() {
        let yaml = "models:\n  - name: a\n    provider: gemini\nextra_markers:\n  pirate: [arr]\n";
        let config = RunConfig::from_yaml(yaml).unwrap();
        assert!(matches!(
            config.marker_lexicon(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_prompt_render() {
        let prompts = PromptTemplates::default();
        let prompt = prompts.render(TaskType::Continue, "We was tryna finish");
        assert!(prompt.ends_with("We was tryna finish"));
        assert!(prompt.contains("Continue"));
    }
}
