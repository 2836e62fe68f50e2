//! The extraction engine: cache, backend, parser and validator wired
//! into one pipeline.
//!
//! Control flow per input: cache lookup -> on miss: render prompt ->
//! retry-wrapped backend call -> parse -> validate -> cache store ->
//! return. Batch calls fan out through a bounded semaphore and collect
//! results in input order.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;

use intake_core::{
    FieldValidator, ParseError, ParseMode, ParsedDocument, ResponseParser, ValidationError,
    ValidationRules,
};

use crate::backend::{BackendError, CompletionBackend, GenerationOptions};
use crate::cache::{CacheKey, ResultCache};
use crate::config::{ConfigError, EngineConfig};
use crate::prompt::PromptTemplate;
use crate::retry::RetryPolicy;

/// Errors from a single input's pipeline.
///
/// These never cross into sibling items in a batch: each batch slot
/// carries its own outcome.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("backend returned an empty completion")]
    EmptyCompletion,

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("input text is empty")]
    EmptyInput,
}

/// Coarse error classification carried across the cache and batch
/// boundaries, and out to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    TransientBackend,
    FatalBackend,
    EmptyCompletion,
    LoopDetected,
    Validation,
    EmptyInput,
}

/// A cloneable, serializable description of a pipeline failure.
///
/// Used as the cache's error sentinel and as the per-item error value
/// in batch results.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&EngineError> for ErrorDescriptor {
    fn from(error: &EngineError) -> Self {
        let kind = match error {
            EngineError::Config(_) => ErrorKind::Config,
            EngineError::Backend(e) if e.is_transient() => ErrorKind::TransientBackend,
            EngineError::Backend(_) => ErrorKind::FatalBackend,
            EngineError::EmptyCompletion => ErrorKind::EmptyCompletion,
            EngineError::Parse(ParseError::LoopDetected { .. }) => ErrorKind::LoopDetected,
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::EmptyInput => ErrorKind::EmptyInput,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

/// Outcome of one input's extraction: a document or an error value.
pub type ExtractionResult = Result<ParsedDocument, ErrorDescriptor>;

/// The extraction engine.
///
/// Construct once from validated configuration and an injected
/// backend; the engine owns the compiled template, rules, retry policy
/// and result cache. The cache is the only shared mutable state and
/// handles its own synchronization.
pub struct ExtractionEngine {
    backend: Arc<dyn CompletionBackend>,
    template: PromptTemplate,
    rules: ValidationRules,
    generation: GenerationOptions,
    retry: RetryPolicy,
    cache: ResultCache,
    default_mode: ParseMode,
    concurrency: usize,
}

impl ExtractionEngine {
    /// Build an engine from configuration and a backend.
    ///
    /// Fails fast on configuration problems: a bad template or
    /// validation pattern surfaces here, before any request is served.
    pub fn new(
        config: &EngineConfig,
        backend: Arc<dyn CompletionBackend>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            backend,
            template: PromptTemplate::new(&config.prompt_template)?,
            rules: ValidationRules::compile(&config.field_validation)?,
            generation: config.generation.clone(),
            retry: config.retry.clone(),
            cache: ResultCache::new(config.cache.max_entries, config.cache.ttl),
            default_mode: config.mode,
            concurrency: config.batch.concurrency_for(config.environment),
        })
    }

    /// Default parse mode from configuration.
    pub fn default_mode(&self) -> ParseMode {
        self.default_mode
    }

    /// Parse one input through the cached pipeline.
    ///
    /// Identical input text in the same mode is computed at most once
    /// per TTL, and at most once concurrently.
    pub async fn parse(&self, text: &str, mode: ParseMode) -> ExtractionResult {
        if text.trim().is_empty() {
            return Err(ErrorDescriptor::from(&EngineError::EmptyInput));
        }

        let key = CacheKey::new(text, mode);
        self.cache
            .get_or_compute(key, self.run_pipeline(text, mode))
            .await
    }

    /// Parse many inputs concurrently, bounded by the configured
    /// concurrency limit.
    ///
    /// `results[i]` corresponds to `texts[i]`. A failing item occupies
    /// its own slot and never cancels its siblings.
    pub async fn parse_batch(&self, texts: &[String], mode: ParseMode) -> Vec<ExtractionResult> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let tasks = texts.iter().map(|text| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                match semaphore.acquire().await {
                    Ok(_permit) => self.parse(text, mode).await,
                    // Only possible if the semaphore is closed, which
                    // this engine never does.
                    Err(_) => Err(ErrorDescriptor {
                        kind: ErrorKind::Config,
                        message: "batch scheduler unavailable".to_string(),
                    }),
                }
            }
        });

        let results = futures::future::join_all(tasks).await;
        let failures = results.iter().filter(|r| r.is_err()).count();
        tracing::info!(total = results.len(), failures, "batch parse finished");
        results
    }

    /// Purge the result cache.
    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
        tracing::info!("result cache cleared");
    }

    /// Number of cached results (approximate).
    pub fn cached_results(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Whether the configured backend is reachable.
    pub async fn check_backend_reachable(&self) -> bool {
        self.backend.health_check().await
    }

    async fn run_pipeline(&self, text: &str, mode: ParseMode) -> ExtractionResult {
        let started = Instant::now();
        match self.extract(text, mode).await {
            Ok(document) => {
                tracing::debug!(
                    sections = document.len(),
                    fields = document.field_count(),
                    elapsed = ?started.elapsed(),
                    "extraction succeeded"
                );
                Ok(document)
            }
            Err(error) => {
                tracing::error!(error = %error, elapsed = ?started.elapsed(), "extraction failed");
                Err(ErrorDescriptor::from(&error))
            }
        }
    }

    async fn extract(&self, text: &str, mode: ParseMode) -> Result<ParsedDocument, EngineError> {
        let prompt = self.template.render(text);

        let raw = self
            .retry
            .run(
                || async { self.backend.complete(&prompt, &self.generation).await },
                BackendError::is_transient,
            )
            .await?;

        if raw.trim().is_empty() {
            tracing::warn!(backend = self.backend.name(), "empty completion received");
            return Err(EngineError::EmptyCompletion);
        }

        let document = ResponseParser::new(mode).parse(&raw)?;
        let document = FieldValidator::new(&self.rules, mode).validate(document)?;
        Ok(document)
    }
}
