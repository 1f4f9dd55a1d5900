//! Error types for the edgequake-text2doc library.
//!
//! Four error types, one per layer of the pipeline:
//!
//! * [`ServiceError`] — one failed call to the remote generation service.
//!   Classified as transport, rate-limited, or malformed so the retry loop in
//!   [`crate::pipeline::llm`] can pattern-match on it.
//!
//! * [`GenerationError`] — a chunk that still failed after every attempt.
//!   The page worker turns it into an absent fragment (or a [`PageError`]
//!   under [`crate::config::FailurePolicy::Propagate`]).
//!
//! * [`PageError`] — **Non-fatal**: a whole page failed. Stored inside
//!   [`crate::output::PageResult`]; the page is emitted empty but in place.
//!
//! * [`Text2DocError`] — **Fatal**: the job cannot run at all (invalid page
//!   set, unreadable input, unwritable output, provider not configured).

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-text2doc library.
///
/// Page- and chunk-level failures never surface here; they degrade the
/// affected page instead.
#[derive(Debug, Error)]
pub enum Text2DocError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path, directory, or HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The input exists but is not UTF-8 text.
    #[error("Input '{path}' is not UTF-8 text: {detail}")]
    NotText { path: PathBuf, detail: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The input produced no pages at all.
    #[error("Input '{input}' contains no pages")]
    NoPages { input: String },

    /// Page indices are not unique and contiguous from 0.
    #[error("Invalid page set: {detail}")]
    InvalidPages { detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("Generation provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// docx-rs failed to pack the document archive.
    #[error("Failed to write DOCX '{path}': {detail}")]
    DocxWriteFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// One failed call to the remote generation service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Network failure, timeout, or non-success HTTP status other than 429.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service asked us to slow down (HTTP 429 or equivalent).
    #[error("rate limited{}", .retry_after_secs.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// The service answered, but the body lacks the expected content shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A chunk whose generation failed on every attempt.
///
/// The variant reflects how the last attempt failed.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GenerationError {
    /// Transport or server errors on the final attempt.
    #[error("generation failed after {attempts} attempts: {detail}")]
    Exhausted { attempts: u32, detail: String },

    /// Still rate limited on the final attempt.
    #[error("still rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// The final response had no candidate or no text.
    #[error("malformed response after {attempts} attempts: {detail}")]
    Malformed { attempts: u32, detail: String },
}

impl GenerationError {
    /// Number of service calls made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            GenerationError::Exhausted { attempts, .. }
            | GenerationError::RateLimited { attempts }
            | GenerationError::Malformed { attempts, .. } => *attempts,
        }
    }
}

/// A non-fatal error for a single page.
///
/// Stored alongside [`crate::output::PageResult`] when a page fails.
/// The page's body is empty and the job continues.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// A chunk failed and the failure policy asked to propagate it.
    #[error("Page {page}: chunk {chunk} failed: {source}")]
    ChunkFailed {
        page: usize,
        chunk: usize,
        #[source]
        source: GenerationError,
    },

    /// The page task panicked.
    #[error("Page {page}: worker panicked: {detail}")]
    Panicked { page: usize, detail: String },
}
