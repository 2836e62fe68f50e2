//! Completion backend abstractions.
//!
//! A backend is anything that takes a prompt and returns completion
//! text: a local model server, a hosted completion API, or a managed
//! prediction service. The parser, validator and cache never see the
//! concrete backend; swapping one in is a matter of registering a new
//! [`BackendFactory`].
//!
//! ## Security
//!
//! Backends hold credentials through the [`secrets`] module, which
//! prevents accidental logging and zeroes keys on drop.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "local")]
mod local;

pub use factory::{BackendFactory, BackendRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "local")]
pub use local::{LocalBackend, LocalBackendFactory};

/// Errors from completion backends.
///
/// The split that matters downstream is [`is_transient`]: transient
/// errors are retried per policy, everything else propagates
/// immediately.
///
/// [`is_transient`]: BackendError::is_transient
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("backend error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("authentication failed")]
    Auth,

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("backend not configured: {0}")]
    NotConfigured(String),
}

impl BackendError {
    /// Whether a retry has any chance of succeeding.
    ///
    /// Timeouts, connection failures, rate limits and server-side 5xx
    /// errors are transient. Authentication failures and client-side
    /// errors are not: the same request would fail the same way.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connection(_) | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Auth | Self::MalformedResponse(_) | Self::NotConfigured(_) => false,
        }
    }
}

/// Generation parameters for a completion request.
///
/// `extra` carries backend-specific parameters straight through to the
/// request body (`top_p`, `stop`, and whatever else the backend
/// understands), so new knobs do not require code changes here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature (0.0 for deterministic)
    #[serde(default)]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout", with = "crate::config::duration_secs")]
    pub timeout: Duration,

    /// Backend-specific parameters, passed through verbatim
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            timeout: default_timeout(),
            extra: BTreeMap::new(),
        }
    }
}

/// Backend abstraction allows swapping completion providers.
///
/// This is the ONLY place where model calls are made; the parser and
/// validator operate purely on the returned text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Submit a prompt and return the raw completion text.
    ///
    /// An empty string is a valid return value at this layer; the
    /// engine decides how to handle it.
    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError>;

    /// Check if the backend is reachable.
    async fn health_check(&self) -> bool;

    /// Get backend name for logging.
    fn name(&self) -> &str;
}
