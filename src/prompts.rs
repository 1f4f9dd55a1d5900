//! Prompts for rebuilding extracted page text as HTML.
//!
//! Every chunk is sent as a single self-contained prompt: the formatting
//! instructions followed by the chunk text. Callers can override the
//! instructions via [`crate::config::PipelineConfig::instructions`].

/// Default formatting instructions.
pub const DEFAULT_INSTRUCTIONS: &str = r#"You are a document formatter. The text below was extracted from one page of a scanned document and may be a partial page. Rewrite it as clean, well-structured HTML.

Follow these rules precisely:

1. TEXT PRESERVATION
   - Preserve ALL text content and its reading order
   - Fix obvious OCR errors only if you are completely certain
   - Do NOT translate, summarise, or add content

2. STRUCTURE
   - Use <h1>–<h4> for headings, <p> for paragraphs
   - Use <ul>/<ol> with <li> for lists
   - Use <table> with <tr>, <th>, <td> for tabular data

3. OUTPUT FORMAT
   - Output ONLY an HTML fragment (no <html>, <head>, or <body>)
   - Do NOT wrap the output in ``` fences
   - Do NOT add commentary or explanations"#;

/// Build the prompt for one chunk.
pub fn chunk_prompt(instructions: &str, chunk_text: &str) -> String {
    format!("{instructions}\n\nText:\n\"\"\"\n{}\n\"\"\"", chunk_text.trim())
}
