//! # edgequake-text2doc
//!
//! Rebuild extracted page text into formatted HTML and DOCX documents with an
//! LLM.
//!
//! ## Why this crate?
//!
//! OCR and `pdftotext` output is flat: headings, lists and tables arrive as
//! plain lines. This crate sends the text of each page, cut into
//! sentence-aligned chunks, to a text-generation service that restores the
//! structure as HTML. It then stitches the pages back together in order and
//! projects the result into paragraphs and tables for a DOCX file.
//!
//! The remote service is assumed to be unreliable. Every chunk is retried
//! with exponential backoff, a rate-limit response triggers a fixed cooldown,
//! and a chunk or page that still fails leaves a gap instead of aborting the
//! job.
//!
//! ## Pipeline Overview
//!
//! ```text
//! pages (form-feed text file, *.txt directory, or URL)
//!  │
//!  ├─ 1. Input        resolve pages
//!  ├─ 2. Coordinator  fixed pool of tokio workers, results slotted by page index
//!  ├─ 3. Worker       chunk page → generate each chunk in order → join
//!  ├─ 4. Generation   retry / backoff / rate-limit cooldown per chunk
//!  ├─ 5. Assemble     <section class="page"> per page inside one HTML document
//!  └─ 6. Markup       HTML → paragraph / list / table blocks → DOCX
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_text2doc::{convert, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = PipelineConfig::default();
//!     let output = convert("scan.txt", &config).await?;
//!     println!("{}", output.markup);
//!     eprintln!("{} blocks, {} failed chunks",
//!         output.document.blocks.len(),
//!         output.stats.failed_chunks);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `text2doc` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-text2doc = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod docx;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{FailurePolicy, PipelineConfig, PipelineConfigBuilder};
pub use convert::{convert, convert_pages, convert_sync, convert_to_files, resolve_service, write_markup};
pub use docx::{write_docx, write_docx_blocking};
pub use error::{GenerationError, PageError, ServiceError, Text2DocError};
pub use output::{
    AssembledDocument, Block, ConversionOutput, ConversionStats, OutputDocument, Page, PageResult,
    Paragraph, ParagraphStyle, Table,
};
pub use pipeline::coordinator::Coordinator;
pub use pipeline::llm::GenerationClient;
pub use pipeline::service::{
    Candidate, GeminiService, GenerationResponse, GenerationService, LlmProviderService,
};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
