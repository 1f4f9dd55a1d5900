//! Configuration types for page-text-to-document conversion.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The struct is constructed once and passed by
//! reference into the generation client and the coordinator; nothing in the
//! crate reads retry constants or API keys from global state.

use crate::error::Text2DocError;
use crate::pipeline::service::GenerationService;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a conversion job.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_text2doc::{FailurePolicy, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .concurrency(8)
///     .max_chunk_chars(1500)
///     .failure_policy(FailurePolicy::Degrade)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 8);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Maximum chunk size in characters. Default: 2000.
    ///
    /// A chunk only exceeds this when a single sentence is longer on its own.
    pub max_chunk_chars: usize,

    /// Width of the page worker pool. Default: 4.
    ///
    /// Chunks of one page are always generated sequentially; this bounds how
    /// many pages are in flight at once. Lower it if you hit `429`s.
    pub concurrency: usize,

    /// Total calls per chunk, first attempt included. Default: 3.
    pub max_attempts: u32,

    /// Base delay of the exponential backoff, in milliseconds. Default: 1000.
    ///
    /// After failed attempt `n` the client waits `retry_backoff_ms * 2^(n-1)`:
    /// 1 s → 2 s → 4 s.
    pub retry_backoff_ms: u64,

    /// Fixed pause after a rate-limit response, in seconds. Default: 60.
    pub rate_limit_cooldown_secs: u64,

    /// Per-call timeout for the generation service, in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// What a page worker does with a chunk that failed every attempt.
    pub failure_policy: FailurePolicy,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per chunk. Default: 4096.
    pub max_output_tokens: usize,

    /// Model identifier, e.g. "gemini-1.5-flash". If None, the backend default.
    pub model: Option<String>,

    /// Provider name ("gemini", "openai", "anthropic", "ollama", …).
    /// If None along with `service`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed generation service. Takes precedence over `provider_name`.
    pub service: Option<Arc<dyn GenerationService>>,

    /// API key for the built-in Gemini backend. Falls back to
    /// `GEMINI_API_KEY` / `GOOGLE_API_KEY` when None.
    pub api_key: Option<String>,

    /// Base URL override for the built-in Gemini backend.
    pub endpoint: Option<String>,

    /// Formatting instructions prepended to every chunk. If None, uses
    /// [`crate::prompts::DEFAULT_INSTRUCTIONS`].
    pub instructions: Option<String>,

    /// Title written into the assembled document's `<title>`.
    pub title: Option<String>,

    /// Receives per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 2000,
            concurrency: 4,
            max_attempts: 3,
            retry_backoff_ms: 1000,
            rate_limit_cooldown_secs: 60,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            failure_policy: FailurePolicy::default(),
            temperature: 0.1,
            max_output_tokens: 4096,
            model: None,
            provider_name: None,
            service: None,
            api_key: None,
            endpoint: None,
            instructions: None,
            title: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_chunk_chars", &self.max_chunk_chars)
            .field("concurrency", &self.concurrency)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("rate_limit_cooldown_secs", &self.rate_limit_cooldown_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("failure_policy", &self.failure_policy)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("service", &self.service.as_ref().map(|_| "<dyn GenerationService>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("title", &self.title)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    pub(crate) fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub(crate) fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    pub(crate) fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl fmt::Debug for PipelineConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PipelineConfigBuilder")
            .field(&self.config)
            .finish()
    }
}

impl PipelineConfigBuilder {
    pub fn max_chunk_chars(mut self, n: usize) -> Self {
        self.config.max_chunk_chars = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn rate_limit_cooldown_secs(mut self, secs: u64) -> Self {
        self.config.rate_limit_cooldown_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn service(mut self, service: Arc<dyn GenerationService>) -> Self {
        self.config.service = Some(service);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = Some(url.into());
        self
    }

    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.config.instructions = Some(text.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Text2DocError> {
        let c = &self.config;
        if c.max_chunk_chars == 0 {
            return Err(Text2DocError::InvalidConfig(
                "max_chunk_chars must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(Text2DocError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_attempts == 0 {
            return Err(Text2DocError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What happens to a chunk that failed every generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Drop the chunk and keep going; the page body simply lacks it. (default)
    #[default]
    Degrade,
    /// Fail the whole page with [`crate::error::PageError::ChunkFailed`].
    /// The coordinator still emits the page, empty and in place.
    Propagate,
}
