//! Page worker: one page in, one [`PageResult`] out.
//!
//! Chunks are generated strictly in order, one at a time; concurrency only
//! happens across pages (see [`super::coordinator`]). A chunk that fails every
//! attempt becomes an absent [`Fragment`] and contributes nothing to the body,
//! unless the config asks for [`FailurePolicy::Propagate`].

use crate::config::{FailurePolicy, PipelineConfig};
use crate::error::PageError;
use crate::output::{Fragment, Page, PageResult};
use crate::pipeline::chunker::chunk_page;
use crate::pipeline::llm::GenerationClient;
use crate::pipeline::postprocess::clean_fragment;
use crate::prompts::{chunk_prompt, DEFAULT_INSTRUCTIONS};
use std::time::Instant;
use tracing::{debug, warn};

/// Convert one page.
///
/// Blank pages return an empty result without calling the service.
/// `Err` is only returned under [`FailurePolicy::Propagate`].
pub async fn process_page(
    client: &GenerationClient,
    page: &Page,
    config: &PipelineConfig,
) -> Result<PageResult, PageError> {
    let start = Instant::now();

    if page.is_blank() {
        debug!(page = page.page_num(), "Blank page, skipping generation");
        return Ok(PageResult::empty(page.index));
    }

    let instructions = config
        .instructions
        .as_deref()
        .unwrap_or(DEFAULT_INSTRUCTIONS);
    let chunks = chunk_page(page, config.max_chunk_chars);
    debug!(page = page.page_num(), chunks = chunks.len(), "Chunked page");

    let mut fragments = Vec::with_capacity(chunks.len());
    let mut input_tokens = 0usize;
    let mut output_tokens = 0usize;

    for chunk in &chunks {
        let prompt = chunk_prompt(instructions, &chunk.text);
        let content = match client.generate(&prompt).await {
            Ok(generation) => {
                input_tokens += generation.prompt_tokens;
                output_tokens += generation.output_tokens;
                Some(clean_fragment(&generation.content))
            }
            Err(e) => match config.failure_policy {
                FailurePolicy::Degrade => {
                    warn!(
                        page = page.page_num(),
                        chunk = chunk.chunk_index,
                        "Dropping chunk: {e}"
                    );
                    None
                }
                FailurePolicy::Propagate => {
                    return Err(PageError::ChunkFailed {
                        page: page.page_num(),
                        chunk: chunk.chunk_index,
                        source: e,
                    });
                }
            },
        };
        fragments.push(Fragment {
            page_index: chunk.page_index,
            chunk_index: chunk.chunk_index,
            content,
        });
    }

    Ok(PageResult {
        page_index: page.index,
        body: join_fragments(&fragments),
        chunk_count: fragments.len(),
        failed_chunks: fragments
            .iter()
            .filter(|f| f.content.is_none())
            .map(|f| f.chunk_index)
            .collect(),
        input_tokens,
        output_tokens,
        duration_ms: start.elapsed().as_millis() as u64,
        error: None,
    })
}

/// Join present, non-empty fragment contents in chunk order.
pub fn join_fragments(fragments: &[Fragment]) -> String {
    fragments
        .iter()
        .filter_map(|f| f.content.as_deref())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
