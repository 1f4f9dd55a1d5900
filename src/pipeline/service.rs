//! The remote text-generation service and its backends.
//!
//! [`GenerationService`] is the seam between the retry loop in
//! [`super::llm`] and whatever answers prompts. A backend makes exactly one
//! call per `generate` and classifies failures into [`ServiceError`]; it never
//! retries or sleeps itself.
//!
//! Two backends ship with the crate:
//!
//! * [`GeminiService`] — calls the Gemini `generateContent` REST endpoint
//!   directly with a shared `reqwest::Client`.
//! * [`LlmProviderService`] — wraps any `edgequake_llm::LLMProvider`
//!   (OpenAI, Anthropic, Ollama, …).
//!
//! Both are `Send + Sync`; the underlying HTTP connection pool is the only
//! state shared between page workers.

use crate::config::PipelineConfig;
use crate::error::{ServiceError, Text2DocError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// A remote service that turns one prompt into candidate completions.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Short backend name used in log lines.
    fn name(&self) -> &str;

    /// Make a single call. Shape validation is left to the caller.
    async fn generate(&self, prompt: &str) -> Result<GenerationResponse, ServiceError>;
}

/// A successful HTTP-level answer, before shape validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationResponse {
    pub candidates: Vec<Candidate>,
    pub prompt_tokens: usize,
    pub output_tokens: usize,
}

impl GenerationResponse {
    /// A response with a single text candidate.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                text: Some(content.into()),
            }],
            ..Self::default()
        }
    }
}

/// One completion candidate. `text == None` when the candidate carried no
/// text part (e.g. blocked by a safety filter).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidate {
    pub text: Option<String>,
}

// ── Gemini ───────────────────────────────────────────────────────────────

/// Direct client for the Gemini `generateContent` endpoint.
pub struct GeminiService {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: usize,
}

impl GeminiService {
    pub const DEFAULT_ENDPOINT: &'static str = "https://generativelanguage.googleapis.com";
    pub const DEFAULT_MODEL: &'static str = "gemini-1.5-flash";

    /// Build a client from the pipeline config.
    ///
    /// The API key comes from `config.api_key`, then `GEMINI_API_KEY`, then
    /// `GOOGLE_API_KEY`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, Text2DocError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| non_empty_env("GEMINI_API_KEY"))
            .or_else(|| non_empty_env("GOOGLE_API_KEY"))
            .ok_or_else(|| Text2DocError::ProviderNotConfigured {
                provider: "gemini".into(),
                hint: "Set GEMINI_API_KEY or pass --api-key.".into(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(config.api_timeout())
            .build()
            .map_err(|e| Text2DocError::Internal(format!("Failed to build HTTP client: {e}")))?;

        let model = config
            .model
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_MODEL.to_string());
        let endpoint = config
            .endpoint
            .as_deref()
            .unwrap_or(Self::DEFAULT_ENDPOINT)
            .trim_end_matches('/');
        let url = format!("{endpoint}/v1beta/models/{model}:generateContent");

        Ok(Self {
            client,
            url,
            api_key,
            model,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl GenerationService for GeminiService {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, prompt: &str) -> Result<GenerationResponse, ServiceError> {
        let request = GeminiRequest {
            contents: [GeminiContent {
                role: "user",
                parts: [GeminiPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            return Err(ServiceError::RateLimited { retry_after_secs });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ServiceError::Transport(format!(
                "HTTP {status}: {}",
                truncate(&body, 200)
            )));
        }

        debug!("Gemini response: {} bytes", body.len());
        parse_gemini_body(&body)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: [GeminiContent<'a>; 1],
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: [GeminiPart<'a>; 1],
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: usize,
    #[serde(default)]
    candidates_token_count: usize,
}

/// Decode a `generateContent` body. Unparseable JSON is a malformed response;
/// missing candidates or text are left for the client to judge.
fn parse_gemini_body(body: &str) -> Result<GenerationResponse, ServiceError> {
    let parsed: GeminiResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::Malformed(format!("invalid JSON: {e}")))?;

    let candidates = parsed
        .candidates
        .into_iter()
        .map(|c| {
            let texts: Vec<String> = c
                .content
                .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
                .unwrap_or_default();
            Candidate {
                text: if texts.is_empty() {
                    None
                } else {
                    Some(texts.concat())
                },
            }
        })
        .collect();

    let (prompt_tokens, output_tokens) = parsed
        .usage_metadata
        .map(|u| (u.prompt_token_count, u.candidates_token_count))
        .unwrap_or((0, 0));

    Ok(GenerationResponse {
        candidates,
        prompt_tokens,
        output_tokens,
    })
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// Adapter exposing an `edgequake_llm` provider as a [`GenerationService`].
pub struct LlmProviderService {
    provider: Arc<dyn LLMProvider>,
    name: String,
    options: CompletionOptions,
}

impl LlmProviderService {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        name: impl Into<String>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            provider,
            name: name.into(),
            options: CompletionOptions {
                temperature: Some(config.temperature),
                max_tokens: Some(config.max_output_tokens),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl GenerationService for LlmProviderService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<GenerationResponse, ServiceError> {
        let messages = vec![ChatMessage::user(prompt)];
        match self.provider.chat(&messages, Some(&self.options)).await {
            Ok(response) => Ok(GenerationResponse {
                candidates: vec![Candidate {
                    text: Some(response.content),
                }],
                prompt_tokens: response.prompt_tokens as usize,
                output_tokens: response.completion_tokens as usize,
            }),
            Err(e) => Err(classify_provider_error(&e.to_string())),
        }
    }
}

/// Providers report throttling in their error text; anything else is
/// treated as a transport failure.
fn classify_provider_error(message: &str) -> ServiceError {
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("ratelimit") {
        ServiceError::RateLimited {
            retry_after_secs: None,
        }
    } else {
        ServiceError::Transport(message.to_string())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
