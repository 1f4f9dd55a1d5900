//! DOCX persistence for an [`OutputDocument`].
//!
//! Body text is Arial 12 pt. Headings are bold and sized by level; list items
//! get a bullet or running number prefix, indented by depth; `<pre>` blocks
//! use a monospace font with their line breaks kept. Tables become Word
//! tables with one paragraph per cell.
//!
//! The archive is packed into a temp file next to the destination and renamed
//! into place, so a crash never leaves a truncated `.docx` behind.

use crate::error::Text2DocError;
use crate::output::{Block, OutputDocument, Paragraph, ParagraphStyle, Table};
use docx_rs::{BreakType, Docx, Run, RunFonts, TableCell, TableRow};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const BODY_FONT: &str = "Arial";
const MONO_FONT: &str = "Courier New";
/// Half-points: 24 = 12 pt.
const BODY_SIZE: usize = 24;

/// Write `document` to `path` as a `.docx`, off the async runtime.
pub async fn write_docx(document: &OutputDocument, path: impl AsRef<Path>) -> Result<(), Text2DocError> {
    let document = document.clone();
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || write_docx_blocking(&document, &path))
        .await
        .map_err(|e| Text2DocError::Internal(format!("DOCX writer task failed: {e}")))?
}

/// Blocking variant of [`write_docx`].
pub fn write_docx_blocking(document: &OutputDocument, path: &Path) -> Result<(), Text2DocError> {
    let docx = build_docx(document);

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| write_failed(path, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| write_failed(path, e))?;
    docx.build()
        .pack(tmp.as_file_mut())
        .map_err(|e| Text2DocError::DocxWriteFailed {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    tmp.persist(path).map_err(|e| write_failed(path, e.error))?;

    info!("Wrote DOCX ({} blocks) to {}", document.blocks.len(), path.display());
    Ok(())
}

fn write_failed(path: &Path, source: std::io::Error) -> Text2DocError {
    Text2DocError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    }
}

/// Build the in-memory document.
fn build_docx(document: &OutputDocument) -> Docx {
    let mut docx = Docx::new()
        .default_fonts(RunFonts::new().ascii(BODY_FONT).hi_ansi(BODY_FONT))
        .default_size(BODY_SIZE);

    // Running number per list depth; any non-list block resets them.
    let mut counters: Vec<usize> = Vec::new();

    for block in &document.blocks {
        match block {
            Block::Paragraph(p) => {
                match p.style {
                    ParagraphStyle::ListItem { ordered, depth } => {
                        counters.truncate(depth + 1);
                        counters.resize(depth + 1, 0);
                        counters[depth] += 1;
                        let prefix = if ordered {
                            format!("{}. ", counters[depth])
                        } else {
                            "• ".to_string()
                        };
                        let indent = "    ".repeat(depth);
                        docx = docx.add_paragraph(
                            docx_rs::Paragraph::new()
                                .add_run(body_run(&format!("{indent}{prefix}{}", p.text))),
                        );
                    }
                    _ => {
                        counters.clear();
                        docx = docx.add_paragraph(paragraph(p));
                    }
                }
            }
            Block::Table(t) => {
                counters.clear();
                docx = docx.add_table(table(t));
            }
        }
    }

    debug!(blocks = document.blocks.len(), "Built DOCX document");
    docx
}

fn body_run(text: &str) -> Run {
    Run::new()
        .add_text(text)
        .size(BODY_SIZE)
        .fonts(RunFonts::new().ascii(BODY_FONT).hi_ansi(BODY_FONT))
}

fn paragraph(p: &Paragraph) -> docx_rs::Paragraph {
    let run = match p.style {
        ParagraphStyle::Heading(level) => body_run(&p.text).bold().size(heading_size(level)),
        ParagraphStyle::Preformatted => {
            let mut run = Run::new()
                .size(BODY_SIZE - 4)
                .fonts(RunFonts::new().ascii(MONO_FONT).hi_ansi(MONO_FONT));
            for (i, line) in p.text.split('\n').enumerate() {
                if i > 0 {
                    run = run.add_break(BreakType::TextWrapping);
                }
                run = run.add_text(line);
            }
            run
        }
        ParagraphStyle::Body | ParagraphStyle::ListItem { .. } => body_run(&p.text),
    };
    docx_rs::Paragraph::new().add_run(run)
}

/// h1 = 20 pt down to h6 = 12 pt, in half-points.
fn heading_size(level: u8) -> usize {
    match level {
        1 => 40,
        2 => 32,
        3 => 28,
        4 => 26,
        _ => BODY_SIZE,
    }
}

fn table(t: &Table) -> docx_rs::Table {
    let rows = t
        .rows
        .iter()
        .map(|row| {
            TableRow::new(
                row.iter()
                    .map(|cell| {
                        TableCell::new().add_paragraph(docx_rs::Paragraph::new().add_run(body_run(cell)))
                    })
                    .collect(),
            )
        })
        .collect();
    docx_rs::Table::new(rows)
}
