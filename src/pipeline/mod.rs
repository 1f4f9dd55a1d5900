//! Pipeline stages for page-text-to-document conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different generation backend) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ coordinator ─┬─▶ worker ──▶ chunker ──▶ llm ──▶ postprocess
//! (pages)  (worker pool) │   (per page, chunks in order)  (retry)
//!                        └─▶ assemble ──▶ markup
//!                            (HTML)       (blocks)
//! ```
//!
//! 1. [`input`]       — read pages from a file, a directory, or a URL
//! 2. [`coordinator`] — run pages on a fixed pool of tokio tasks and collect
//!    results by page index
//! 3. [`worker`]      — chunk one page and generate its chunks sequentially
//! 4. [`chunker`]     — cut page text into sentence-aligned, size-bounded chunks
//! 5. [`llm`]         — drive one generation with retry/backoff; the only
//!    stage with network I/O, through a [`service::GenerationService`]
//! 6. [`postprocess`] — deterministic cleanup of generated fragments
//! 7. [`assemble`]    — wrap ordered page bodies in an HTML document
//! 8. [`markup`]      — project the HTML into paragraph and table blocks

pub mod assemble;
pub mod chunker;
pub mod coordinator;
pub mod input;
pub mod llm;
pub mod markup;
pub mod postprocess;
pub mod service;
pub mod worker;
