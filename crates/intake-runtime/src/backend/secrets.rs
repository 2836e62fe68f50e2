//! Secure credential handling for completion backends.
//!
//! API keys flow through [`ApiCredential`], which:
//!
//! - cannot leak through `Debug` output (shows `[REDACTED]`)
//! - is zeroed on drop via the `secrecy` crate
//! - must be exposed explicitly with [`ApiCredential::expose`]
//! - tracks where it was loaded from, for diagnosing config issues
//!   without printing the value

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::BackendError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Loaded from configuration
    Config,
    /// Loaded from an environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored API credential.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    /// Wrap a credential value.
    ///
    /// After this point the value can no longer be logged by accident.
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load a credential from an environment variable.
    pub fn from_env(env_var: &str, name: &'static str) -> Result<Self, BackendError> {
        std::env::var(env_var)
            .map(|v| Self::new(v, CredentialSource::Environment, name))
            .map_err(|_| {
                BackendError::NotConfigured(format!(
                    "{name} not set: configure the '{env_var}' environment variable"
                ))
            })
    }

    /// Load a credential from JSON config, falling back to an
    /// environment variable.
    pub fn from_config_or_env(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, BackendError> {
        if let Some(value) = config[config_key].as_str() {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }
        Self::from_env(env_var, name).map_err(|_| {
            BackendError::NotConfigured(format!(
                "{name} required: set '{config_key}' in config or the '{env_var}' environment variable"
            ))
        })
    }

    /// Check whether a credential is available without loading it.
    pub fn is_available(config: &JsonValue, config_key: &str, env_var: &str) -> bool {
        config[config_key].is_string() || std::env::var(env_var).is_ok()
    }

    /// Expose the credential value.
    ///
    /// Call this only at the point of use, typically when building an
    /// HTTP header.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    /// Whether the stored value is empty.
    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    /// Where this credential came from.
    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_output_is_redacted() {
        let cred = ApiCredential::new(
            "sk-super-secret-12345",
            CredentialSource::Programmatic,
            "test key",
        );
        let debug = format!("{cred:?}");
        assert!(!debug.contains("sk-super-secret-12345"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_expose_returns_value() {
        let cred = ApiCredential::new("sk-key", CredentialSource::Config, "test key");
        assert_eq!(cred.expose(), "sk-key");
        assert!(!cred.is_empty());
    }

    #[test]
    fn test_source_tracking() {
        let cred = ApiCredential::new("k", CredentialSource::Config, "test key");
        assert_eq!(cred.source(), CredentialSource::Config);
        assert_eq!(cred.source().to_string(), "config");
    }

    #[test]
    fn test_config_value_preferred_over_env() {
        let config = serde_json::json!({"api_key": "from-config"});
        let cred = ApiCredential::from_config_or_env(
            &config,
            "api_key",
            "INTAKE_TEST_UNSET_VAR",
            "test key",
        )
        .unwrap();
        assert_eq!(cred.expose(), "from-config");
        assert_eq!(cred.source(), CredentialSource::Config);
    }

    #[test]
    fn test_missing_everywhere_is_not_configured() {
        let config = serde_json::json!({});
        let result = ApiCredential::from_config_or_env(
            &config,
            "api_key",
            "INTAKE_TEST_UNSET_VAR",
            "test key",
        );
        assert!(matches!(result, Err(BackendError::NotConfigured(_))));
    }
}
