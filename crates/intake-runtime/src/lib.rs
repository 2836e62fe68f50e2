//! # intake-runtime
//!
//! Async runtime for the intake extraction engine: completion
//! backends, retry, result caching and batch orchestration around the
//! deterministic core in `intake-core`.
//!
//! The entry point is [`ExtractionEngine`], built from an
//! [`EngineConfig`] and any [`CompletionBackend`] implementation. The
//! `local` cargo feature enables the bundled OpenAI-compatible HTTP
//! backend.

pub mod backend;
pub mod cache;
pub mod config;
pub mod engine;
pub mod prompt;
pub mod retry;

pub use backend::{BackendError, CompletionBackend, GenerationOptions};
pub use cache::{CacheKey, ResultCache};
pub use config::{ConfigError, EngineConfig, Environment};
pub use engine::{EngineError, ErrorDescriptor, ErrorKind, ExtractionEngine, ExtractionResult};
pub use prompt::{PromptTemplate, INPUT_PLACEHOLDER};
pub use retry::RetryPolicy;
