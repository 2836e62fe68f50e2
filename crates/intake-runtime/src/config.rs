//! Engine configuration.
//!
//! Configuration is loaded once by the caller and injected into
//! [`ExtractionEngine::new`](crate::engine::ExtractionEngine::new);
//! components never reach out to ambient global state. Validation runs
//! at load time so a bad template or pattern is a startup failure, not
//! a mid-request surprise.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use intake_core::{ParseMode, RuleError, ValidationRules};

use crate::backend::GenerationOptions;
use crate::prompt::PromptTemplate;
use crate::retry::RetryPolicy;

/// Environment variable selecting the runtime environment.
pub const ENVIRONMENT_ENV: &str = "INTAKE_ENV";

/// Errors from loading or validating configuration.
///
/// All of these are fatal at startup and never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("prompt template does not contain the '{{{{input_text}}}}' placeholder")]
    MissingPlaceholder,

    #[error(transparent)]
    InvalidPattern(#[from] RuleError),

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Serde helpers for `Duration` fields expressed as whole seconds.
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde helpers for `Duration` fields expressed as humantime strings
/// ("30m", "1h", "90s").
pub(crate) mod human_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Runtime environment, selecting environment-specific limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Detect the environment from `INTAKE_ENV`, defaulting to
    /// development.
    pub fn detect() -> Self {
        match std::env::var(ENVIRONMENT_ENV).as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Time-to-live per entry, as a humantime string ("30m", "1h").
    #[serde(default = "default_cache_ttl", with = "human_duration")]
    pub ttl: Duration,

    /// Maximum number of cached results.
    #[serde(default = "default_cache_entries")]
    pub max_entries: u64,
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_cache_entries() -> u64 {
    500
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
            max_entries: default_cache_entries(),
        }
    }
}

/// Batch concurrency limits per environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_dev_concurrency")]
    pub development_concurrency: usize,

    #[serde(default = "default_prod_concurrency")]
    pub production_concurrency: usize,
}

fn default_dev_concurrency() -> usize {
    4
}

fn default_prod_concurrency() -> usize {
    10
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            development_concurrency: default_dev_concurrency(),
            production_concurrency: default_prod_concurrency(),
        }
    }
}

impl BatchSettings {
    /// Concurrency limit for the given environment.
    pub fn concurrency_for(&self, environment: Environment) -> usize {
        match environment {
            Environment::Development => self.development_concurrency,
            Environment::Production => self.production_concurrency,
        }
    }
}

/// Which backend to talk to, plus its backend-specific options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Backend type, resolved through the
    /// [`BackendRegistry`](crate::backend::BackendRegistry).
    #[serde(rename = "type")]
    pub kind: String,

    /// Backend-specific configuration (base_url, api_key, ...).
    #[serde(flatten)]
    pub options: serde_json::Value,
}

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Prompt template containing the `{{input_text}}` placeholder.
    pub prompt_template: String,

    /// `<field>_pattern` -> regex map for field validation.
    #[serde(default)]
    pub field_validation: BTreeMap<String, String>,

    /// Generation parameters sent with every completion request.
    #[serde(default)]
    pub generation: GenerationOptions,

    /// Default parse mode when the caller does not specify one.
    #[serde(default)]
    pub mode: ParseMode,

    /// Runtime environment; defaults to `INTAKE_ENV` detection.
    #[serde(default = "Environment::detect")]
    pub environment: Environment,

    /// Result cache settings.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Batch concurrency limits.
    #[serde(default)]
    pub batch: BatchSettings,

    /// Retry policy for backend calls.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Backend selection. Optional so embedders can construct the
    /// backend themselves and inject it directly.
    #[serde(default)]
    pub backend: Option<BackendSettings>,
}

impl EngineConfig {
    /// Parse configuration from a YAML string and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML file and validate it.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Validate settings that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        PromptTemplate::new(&self.prompt_template)?;
        ValidationRules::compile(&self.field_validation)?;

        if self.generation.max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                field: "generation.max_tokens".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.batch.development_concurrency == 0 || self.batch.production_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch".to_string(),
                reason: "concurrency limits must be greater than zero".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
prompt_template: |
  Extract the claim details from the email below.
  {{input_text}}
  Respond with **Section** headers and "- Key: Value" lines.
field_validation:
  phone_pattern: '\d{3}-\d{3}-\d{4}'
  email_pattern: '[^@\s]+@[^@\s]+\.[a-z]{2,}'
generation:
  max_tokens: 800
  temperature: 0.1
  timeout: 120
  top_p: 0.9
mode: strict
environment: production
cache:
  ttl: 30m
  max_entries: 250
batch:
  development_concurrency: 2
  production_concurrency: 8
retry:
  max_attempts: 2
  min_backoff: 1
  max_backoff: 5
backend:
  type: local
  base_url: http://localhost:1234
"#;

    #[test]
    fn test_full_config_parses() {
        let config = EngineConfig::from_yaml(FULL_CONFIG).unwrap();
        assert_eq!(config.mode, ParseMode::Strict);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.generation.max_tokens, 800);
        assert_eq!(config.generation.timeout, Duration::from_secs(120));
        assert_eq!(config.generation.extra["top_p"], 0.9);
        assert_eq!(config.cache.ttl, Duration::from_secs(1800));
        assert_eq!(config.cache.max_entries, 250);
        assert_eq!(config.batch.production_concurrency, 8);
        assert_eq!(config.retry.max_attempts, 2);

        let backend = config.backend.unwrap();
        assert_eq!(backend.kind, "local");
        assert_eq!(backend.options["base_url"], "http://localhost:1234");
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = EngineConfig::from_yaml("prompt_template: 'parse {{input_text}} now'\n").unwrap();
        assert_eq!(config.mode, ParseMode::Lenient);
        assert_eq!(config.cache.max_entries, 500);
        assert_eq!(config.batch.development_concurrency, 4);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.backend.is_none());
    }

    #[test]
    fn test_template_without_placeholder_rejected() {
        let result = EngineConfig::from_yaml("prompt_template: 'no placeholder'\n");
        assert!(matches!(result, Err(ConfigError::MissingPlaceholder)));
    }

    #[test]
    fn test_invalid_validation_pattern_rejected() {
        let yaml = "prompt_template: 'x {{input_text}}'\nfield_validation:\n  phone_pattern: '(unclosed'\n";
        let result = EngineConfig::from_yaml(yaml);
        assert!(matches!(result, Err(ConfigError::InvalidPattern(_))));
    }

    #[test]
    fn test_zero_max_tokens_rejected() {
        let yaml = "prompt_template: 'x {{input_text}}'\ngeneration:\n  max_tokens: 0\n";
        let result = EngineConfig::from_yaml(yaml);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_concurrency_limit_selection() {
        let batch = BatchSettings {
            development_concurrency: 2,
            production_concurrency: 16,
        };
        assert_eq!(batch.concurrency_for(Environment::Development), 2);
        assert_eq!(batch.concurrency_for(Environment::Production), 16);
    }
}
