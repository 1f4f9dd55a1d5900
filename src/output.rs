//! Data model flowing through the pipeline, and the results handed back to
//! callers.
//!
//! ```text
//! Page ──chunker──▶ Chunk ──llm──▶ Fragment ──worker──▶ PageResult
//!   ──assemble──▶ AssembledDocument ──markup──▶ OutputDocument
//! ```

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One physical page of extracted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 0-based position in the source document.
    pub index: usize,
    /// Raw extracted text.
    pub text: String,
}

impl Page {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// 1-based page number, for logs and markup.
    pub fn page_num(&self) -> usize {
        self.index + 1
    }

    /// True when the page has no extractable text.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A size-bounded slice of a page's text, sent as one generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub page_index: usize,
    pub chunk_index: usize,
    pub text: String,
}

/// Generated content for one chunk. `content == None` means every attempt
/// failed, which is not the same as an empty successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub page_index: usize,
    pub chunk_index: usize,
    pub content: Option<String>,
}

/// Result of converting a single page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 0-based page index.
    pub page_index: usize,
    /// Successful fragments joined in chunk order. Empty on page failure.
    pub body: String,
    /// Number of chunks the page was cut into.
    pub chunk_count: usize,
    /// Indices of chunks whose generation failed.
    pub failed_chunks: Vec<usize>,
    /// Prompt tokens consumed across all chunks.
    pub input_tokens: usize,
    /// Tokens generated across all chunks.
    pub output_tokens: usize,
    /// Wall-clock time spent on the page.
    pub duration_ms: u64,
    /// Set when the page was demoted to an empty result.
    pub error: Option<PageError>,
}

impl PageResult {
    /// An empty, successful result (blank page).
    pub fn empty(page_index: usize) -> Self {
        Self {
            page_index,
            body: String::new(),
            chunk_count: 0,
            failed_chunks: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            error: None,
        }
    }

    /// An empty result carrying the page-level error that caused it.
    pub fn failed(page_index: usize, error: PageError) -> Self {
        Self {
            error: Some(error),
            ..Self::empty(page_index)
        }
    }

    /// 1-based page number.
    pub fn page_num(&self) -> usize {
        self.page_index + 1
    }
}

/// The whole-document markup string produced by the assembler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssembledDocument(String);

impl AssembledDocument {
    pub(crate) fn new(markup: String) -> Self {
        Self(markup)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for AssembledDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AssembledDocument {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Portable document produced from the markup: an ordered list of blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDocument {
    pub blocks: Vec<Block>,
}

impl OutputDocument {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Iterate over the text of every paragraph block.
    pub fn paragraphs(&self) -> impl Iterator<Item = &Paragraph> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Paragraph(p) => Some(p),
            Block::Table(_) => None,
        })
    }

    /// Iterate over every table block.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Table(t) => Some(t),
            Block::Paragraph(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    pub text: String,
    pub style: ParagraphStyle,
}

/// The only layout signal that survives conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphStyle {
    #[default]
    Body,
    /// `<h1>`–`<h6>`.
    Heading(u8),
    /// `<li>`; `depth` is 0 for a top-level list.
    ListItem { ordered: bool, depth: usize },
    /// `<pre>`; internal line breaks are kept.
    Preformatted,
}

/// A rectangular grid of cell text. Every row has `num_cols` cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub num_cols: usize,
    pub rows: Vec<Vec<String>>,
}

/// Aggregate statistics for a conversion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_pages: usize,
    /// Pages without a page-level error (blank pages included).
    pub processed_pages: usize,
    /// Pages demoted to an empty result.
    pub failed_pages: usize,
    /// Pages with no extractable text.
    pub blank_pages: usize,
    pub total_chunks: usize,
    pub failed_chunks: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub generation_duration_ms: u64,
}

/// Everything a conversion produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Assembled HTML, pages in order.
    pub markup: AssembledDocument,
    /// Per-page results, ordered by page index.
    pub pages: Vec<PageResult>,
    /// Block projection of `markup`, ready for a DOCX writer.
    pub document: OutputDocument,
    pub stats: ConversionStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;

    #[test]
    fn blank_page_detection() {
        assert!(Page::new(0, "  \n\t ").is_blank());
        assert!(!Page::new(0, "text").is_blank());
        assert_eq!(Page::new(4, "").page_num(), 5);
    }

    #[test]
    fn failed_result_is_empty_and_keeps_index() {
        let r = PageResult::failed(
            3,
            PageError::ChunkFailed {
                page: 4,
                chunk: 0,
                source: GenerationError::RateLimited { attempts: 3 },
            },
        );
        assert_eq!(r.page_index, 3);
        assert!(r.body.is_empty());
        assert!(r.error.is_some());
    }

    #[test]
    fn block_serialises_with_type_tag() {
        let b = Block::Paragraph(Paragraph {
            text: "hi".into(),
            style: ParagraphStyle::Heading(2),
        });
        let json = serde_json::to_string(&b).unwrap();
        assert!(json.contains(r#""type":"paragraph""#), "got: {json}");
    }
}
