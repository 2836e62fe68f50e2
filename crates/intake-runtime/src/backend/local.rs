//! Local model server backend (OpenAI-compatible completions API).
//!
//! Talks to an LM Studio style server exposing `/v1/completions` and
//! `/v1/models`. Most local servers ignore the API key, but the header
//! is always sent so the same backend works against gateways that do
//! check it.

use super::{
    factory::BackendFactory,
    secrets::{ApiCredential, CredentialSource},
    BackendError, CompletionBackend, GenerationOptions,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable consulted when the config omits `api_key`.
pub const LOCAL_API_KEY_ENV: &str = "INTAKE_LOCAL_API_KEY";

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend for an OpenAI-compatible local completion server.
pub struct LocalBackend {
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl LocalBackend {
    /// Create a backend for the given server URL.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, BackendError> {
        Self::build(
            base_url.into(),
            ApiCredential::new(api_key, CredentialSource::Programmatic, "local backend API key"),
        )
    }

    /// Create from JSON configuration.
    ///
    /// `base_url` is required; `api_key` falls back to the
    /// `INTAKE_LOCAL_API_KEY` environment variable and finally to a
    /// placeholder value, since most local servers do not check it.
    pub fn from_config(config: &JsonValue) -> Result<Self, BackendError> {
        let base_url = config["base_url"]
            .as_str()
            .ok_or_else(|| {
                BackendError::NotConfigured("local backend requires 'base_url'".to_string())
            })?
            .trim_end_matches('/')
            .to_string();

        let credential =
            ApiCredential::from_config_or_env(config, "api_key", LOCAL_API_KEY_ENV, "local backend API key")
                .unwrap_or_else(|_| {
                    ApiCredential::new("not-needed", CredentialSource::Programmatic, "local backend API key")
                });

        Self::build(base_url, credential)
    }

    fn build(base_url: String, credential: ApiCredential) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::NotConfigured(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            credential,
            base_url,
            client,
        })
    }
}

/// OpenAI-compatible completions request body.
#[derive(Debug, Serialize)]
struct CompletionsRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(flatten)]
    extra: &'a BTreeMap<String, JsonValue>,
}

#[derive(Debug, Deserialize)]
struct CompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiErrorDetail {
    Structured { message: String },
    Plain(String),
}

impl ApiErrorDetail {
    fn message(self) -> String {
        match self {
            Self::Structured { message } => message,
            Self::Plain(message) => message,
        }
    }
}

#[async_trait]
impl CompletionBackend for LocalBackend {
    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        let request = CompletionsRequest {
            prompt,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            extra: &options.extra,
        };

        // Credential exposed only here, at the point of use.
        let response = self
            .client
            .post(format!("{}/v1/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .timeout(options.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(options.timeout)
                } else {
                    BackendError::Connection(e.to_string())
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(BackendError::RateLimited { retry_after });
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(BackendError::Auth);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|e| e.error.message())
                .unwrap_or(body);
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: CompletionsResponse = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        let completion = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.text)
            .unwrap_or_default();

        Ok(completion)
    }

    async fn health_check(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .bearer_auth(self.credential.expose())
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "backend health check failed");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "backend unreachable");
                false
            }
        }
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Factory for creating local backends from configuration.
///
/// ## Configuration Format
/// ```json
/// {
///   "base_url": "http://localhost:1234",  // Required
///   "api_key": "lm-studio"                // Optional
/// }
/// ```
pub struct LocalBackendFactory;

impl BackendFactory for LocalBackendFactory {
    fn backend_type(&self) -> &'static str {
        "local"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn CompletionBackend>, BackendError> {
        let backend = LocalBackend::from_config(config)?;
        Ok(Arc::new(backend))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), BackendError> {
        let Some(url) = config["base_url"].as_str() else {
            return Err(BackendError::NotConfigured(
                "local backend requires 'base_url'".to_string(),
            ));
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(BackendError::NotConfigured(
                "base_url must start with http:// or https://".to_string(),
            ));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "OpenAI-compatible local completion server (LM Studio and friends)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_creation() {
        let backend = LocalBackend::new("http://localhost:1234", "lm-studio").unwrap();
        assert_eq!(backend.name(), "local");
    }

    #[test]
    fn test_from_config_trims_trailing_slash() {
        let config = serde_json::json!({
            "base_url": "http://localhost:1234/",
            "api_key": "k"
        });
        let backend = LocalBackend::from_config(&config).unwrap();
        assert_eq!(backend.base_url, "http://localhost:1234");
    }

    #[test]
    fn test_from_config_requires_base_url() {
        let result = LocalBackend::from_config(&serde_json::json!({}));
        assert!(matches!(result, Err(BackendError::NotConfigured(_))));
    }

    #[test]
    fn test_factory_validates_url_scheme() {
        let factory = LocalBackendFactory;
        let bad = serde_json::json!({"base_url": "localhost:1234"});
        assert!(factory.validate_config(&bad).is_err());

        let good = serde_json::json!({"base_url": "http://localhost:1234"});
        assert!(factory.validate_config(&good).is_ok());
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret = "sk-local-super-secret";
        let backend = LocalBackend::new("http://localhost:1234", secret).unwrap();
        let debug = format!("{backend:?}");
        assert!(!debug.contains(secret));
        assert!(debug.contains("[REDACTED]"));
    }
}
