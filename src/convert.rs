//! Top-level conversion entry points.
//!
//! [`convert_pages`] is the core: pages in, [`ConversionOutput`] out. The
//! other entry points add input resolution ([`convert`]), file output
//! ([`convert_to_files`]) or a private runtime ([`convert_sync`]).

use crate::config::PipelineConfig;
use crate::docx::write_docx;
use crate::error::Text2DocError;
use crate::output::{AssembledDocument, ConversionOutput, ConversionStats, Page, PageResult};
use crate::pipeline::assemble::assemble;
use crate::pipeline::coordinator::{validate_pages, Coordinator};
use crate::pipeline::input;
use crate::pipeline::llm::GenerationClient;
use crate::pipeline::markup;
use crate::pipeline::service::{GeminiService, GenerationService, LlmProviderService};
use edgequake_llm::ProviderFactory;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Model used with a named non-Gemini provider when none is configured.
const DEFAULT_PROVIDER_MODEL: &str = "gpt-4.1-nano";

/// Convert already-extracted pages.
///
/// # Returns
/// `Ok(ConversionOutput)` even if some pages or chunks failed; check
/// `output.stats.failed_pages` and `output.stats.failed_chunks`.
///
/// # Errors
/// Only fatal errors: an invalid page set (duplicate or missing indices) or
/// a provider that cannot be configured.
pub async fn convert_pages(pages: Vec<Page>, config: &PipelineConfig) -> Result<ConversionOutput, Text2DocError> {
    let total_start = Instant::now();
    let pages = validate_pages(pages)?;
    let blank_pages = pages.iter().filter(|p| p.is_blank()).count();

    let service = resolve_service(config).await?;
    let client = Arc::new(GenerationClient::new(service, config));
    info!(
        service = client.service_name(),
        pages = pages.len(),
        "Starting conversion"
    );

    let generation_start = Instant::now();
    let results = Coordinator::new(client, config).process_pages(pages).await?;
    let generation_duration_ms = generation_start.elapsed().as_millis() as u64;

    let markup = assemble(&results, config.title.as_deref())?;
    let document = markup::convert(&markup);

    let mut stats = compute_stats(&results, blank_pages);
    stats.generation_duration_ms = generation_duration_ms;
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "Conversion complete: {}/{} pages, {} failed chunks, {}ms total",
        stats.processed_pages, stats.total_pages, stats.failed_chunks, stats.total_duration_ms
    );

    Ok(ConversionOutput {
        markup,
        pages: results,
        document,
        stats,
    })
}

/// Resolve `input` (file, directory or URL) to pages and convert them.
pub async fn convert(input_str: impl AsRef<str>, config: &PipelineConfig) -> Result<ConversionOutput, Text2DocError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);
    let pages = input::resolve_pages(input_str, config.download_timeout_secs).await?;
    convert_pages(pages, config).await
}

/// Convert `input` and write the markup to `html_path`, plus a `.docx` when
/// `docx_path` is given.
///
/// Both files are written atomically (temp file + rename).
pub async fn convert_to_files(
    input_str: impl AsRef<str>,
    html_path: impl AsRef<Path>,
    docx_path: Option<&Path>,
    config: &PipelineConfig,
) -> Result<ConversionStats, Text2DocError> {
    let output = convert(input_str, config).await?;
    write_markup(&output.markup, html_path.as_ref()).await?;
    if let Some(docx_path) = docx_path {
        write_docx(&output.document, docx_path).await?;
    }
    Ok(output.stats)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(input_str: impl AsRef<str>, config: &PipelineConfig) -> Result<ConversionOutput, Text2DocError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Text2DocError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// Atomically write assembled markup to `path`.
pub async fn write_markup(markup: &AssembledDocument, path: &Path) -> Result<(), Text2DocError> {
    let contents = markup.as_str().to_owned();
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic(&path, contents.as_bytes()))
        .await
        .map_err(|e| Text2DocError::Internal(format!("Writer task failed: {e}")))?
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Text2DocError> {
    let write_failed = |source| Text2DocError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_failed)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_failed)?;
    tmp.write_all(bytes).map_err(write_failed)?;
    tmp.persist(path).map_err(|e| write_failed(e.error))?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

fn compute_stats(results: &[PageResult], blank_pages: usize) -> ConversionStats {
    ConversionStats {
        total_pages: results.len(),
        processed_pages: results.iter().filter(|r| r.error.is_none()).count(),
        failed_pages: results.iter().filter(|r| r.error.is_some()).count(),
        blank_pages,
        total_chunks: results.iter().map(|r| r.chunk_count).sum(),
        failed_chunks: results.iter().map(|r| r.failed_chunks.len()).sum(),
        total_input_tokens: results.iter().map(|r| r.input_tokens as u64).sum(),
        total_output_tokens: results.iter().map(|r| r.output_tokens as u64).sum(),
        total_duration_ms: 0,
        generation_duration_ms: 0,
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Resolve the generation service, from most-specific to least-specific.
///
/// 1. **Pre-built service** (`config.service`), used as-is. Tests and callers
///    with custom middleware go through here.
/// 2. **Named provider** (`config.provider_name`). `"gemini"` selects the
///    built-in [`GeminiService`]; any other name goes through
///    [`ProviderFactory::create_llm_provider`], which reads that provider's
///    API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    checked before key sniffing so the model choice is honoured even when
///    several API keys are present.
/// 4. **Gemini key present** (`GEMINI_API_KEY` / `GOOGLE_API_KEY`).
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`].
pub async fn resolve_service(config: &PipelineConfig) -> Result<Arc<dyn GenerationService>, Text2DocError> {
    if let Some(ref service) = config.service {
        return Ok(Arc::clone(service));
    }

    if let Some(ref name) = config.provider_name {
        return named_service(name, config.model.as_deref(), config);
    }

    if let (Ok(provider), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !provider.is_empty() && !model.is_empty() {
            return named_service(&provider, Some(&model), config);
        }
    }

    let has_gemini_key = ["GEMINI_API_KEY", "GOOGLE_API_KEY"]
        .iter()
        .any(|k| std::env::var(k).is_ok_and(|v| !v.is_empty()));
    if config.api_key.is_some() || has_gemini_key {
        return Ok(Arc::new(GeminiService::from_config(config)?));
    }

    let (llm, _embedding) = ProviderFactory::from_env().map_err(|e| Text2DocError::ProviderNotConfigured {
        provider: "auto".to_string(),
        hint: format!(
            "No generation provider could be auto-detected from environment.\n\
            Set GEMINI_API_KEY, OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
            Error: {}",
            e
        ),
    })?;
    Ok(Arc::new(LlmProviderService::new(llm, "auto", config)))
}

fn named_service(
    name: &str,
    model: Option<&str>,
    config: &PipelineConfig,
) -> Result<Arc<dyn GenerationService>, Text2DocError> {
    if name.eq_ignore_ascii_case("gemini") {
        let mut config = config.clone();
        if let Some(model) = model {
            config.model = Some(model.to_string());
        }
        return Ok(Arc::new(GeminiService::from_config(&config)?));
    }

    let model = model.unwrap_or(DEFAULT_PROVIDER_MODEL);
    let provider = ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        Text2DocError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    debug!("Using provider {} with model {}", name, model);
    Ok(Arc::new(LlmProviderService::new(provider, name, config)))
}
