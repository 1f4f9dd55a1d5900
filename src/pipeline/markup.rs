//! Markup-to-output conversion: assembled HTML in, [`OutputDocument`] out.
//!
//! The tree is walked in document order. Headings, paragraphs, `<pre>`, list
//! items and tables each become one block; text sitting loose inside a
//! container is gathered into body paragraphs. Styling below that level is
//! discarded.

use crate::output::{AssembledDocument, Block, OutputDocument, Paragraph, ParagraphStyle, Table};
use scraper::{ElementRef, Html};
use tracing::debug;

/// Upper bound on a single cell's `colspan`.
const MAX_COLSPAN: usize = 1000;

/// Project an assembled document into blocks.
pub fn convert(doc: &AssembledDocument) -> OutputDocument {
    convert_markup(doc.as_str())
}

/// Same as [`convert`], for arbitrary HTML.
pub fn convert_markup(markup: &str) -> OutputDocument {
    let html = Html::parse_document(markup);
    let mut walker = Walker::default();
    walker.walk(html.root_element());
    walker.flush_inline();
    debug!(blocks = walker.blocks.len(), "Converted markup");
    OutputDocument {
        blocks: walker.blocks,
    }
}

#[derive(Default)]
struct Walker {
    blocks: Vec<Block>,
    /// Loose text waiting to become a body paragraph.
    inline: String,
}

impl Walker {
    fn walk(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        match name {
            "head" | "script" | "style" | "noscript" | "template" => {}
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush_inline();
                let level = name[1..].parse().unwrap_or(1);
                self.push_paragraph(normalized_text(element), ParagraphStyle::Heading(level));
            }
            "p" | "address" | "summary" | "caption" | "dt" | "dd" | "figcaption" => {
                self.flush_inline();
                self.push_paragraph(normalized_text(element), ParagraphStyle::Body);
            }
            "pre" => {
                self.flush_inline();
                let raw: String = element.text().collect();
                let text = raw
                    .trim_matches('\n')
                    .lines()
                    .map(str::trim_end)
                    .collect::<Vec<_>>()
                    .join("\n");
                self.push_paragraph(text, ParagraphStyle::Preformatted);
            }
            "ul" | "ol" => {
                self.flush_inline();
                self.list(element, name == "ol", 0);
            }
            "table" => {
                self.flush_inline();
                self.table(element);
            }
            "br" => self.inline.push(' '),
            "html" | "body" | "section" | "article" | "main" | "div" | "header" | "footer"
            | "nav" | "aside" | "blockquote" | "figure" | "dl" | "form" | "fieldset" | "li"
            | "hr" => {
                self.flush_inline();
                self.walk_children(element);
                self.flush_inline();
            }
            // Inline elements contribute their text to the surrounding run.
            _ => self.walk_children(element),
        }
    }

    fn walk_children(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            if let Some(child_element) = ElementRef::wrap(child) {
                self.walk(child_element);
            } else if let Some(text) = child.value().as_text() {
                self.inline.push_str(text);
            }
        }
    }

    fn flush_inline(&mut self) {
        if self.inline.is_empty() {
            return;
        }
        let text = collapse_whitespace(&self.inline);
        self.inline.clear();
        self.push_paragraph(text, ParagraphStyle::Body);
    }

    fn push_paragraph(&mut self, text: String, style: ParagraphStyle) {
        if text.trim().is_empty() {
            return;
        }
        self.blocks.push(Block::Paragraph(Paragraph { text, style }));
    }

    /// Emit one block per `<li>`, recursing into nested lists with `depth + 1`.
    fn list(&mut self, list: ElementRef<'_>, ordered: bool, depth: usize) {
        for child in list.children().filter_map(ElementRef::wrap) {
            match child.value().name() {
                "li" => {
                    let mut own = String::new();
                    text_outside_lists(child, &mut own);
                    self.push_paragraph(
                        collapse_whitespace(&own),
                        ParagraphStyle::ListItem { ordered, depth },
                    );
                    for nested in nested_lists(child) {
                        self.list(nested, nested.value().name() == "ol", depth + 1);
                    }
                }
                // A list directly inside a list: tolerated, treated as nested.
                "ul" | "ol" => self.list(child, child.value().name() == "ol", depth + 1),
                _ => {}
            }
        }
    }

    fn table(&mut self, table: ElementRef<'_>) {
        let mut rows: Vec<Vec<String>> = direct_rows(table)
            .into_iter()
            .map(|row| {
                let mut cells = Vec::new();
                for cell in direct_cells(row) {
                    cells.push(normalized_text(cell));
                    for _ in 1..colspan(cell) {
                        cells.push(String::new());
                    }
                }
                cells
            })
            .filter(|cells| !cells.is_empty())
            .collect();

        let num_cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        if rows.is_empty() || num_cols == 0 {
            debug!("Skipping table without rows or columns");
            return;
        }
        for row in &mut rows {
            row.resize(num_cols, String::new());
        }
        self.blocks.push(Block::Table(Table { num_cols, rows }));
    }
}

/// `<tr>` children of the table, looking through `<thead>`/`<tbody>`/`<tfoot>`
/// but never into nested tables.
fn direct_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|e| e.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}

fn direct_cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|e| matches!(e.value().name(), "td" | "th"))
        .collect()
}

/// Leading digits of the `colspan` attribute, defaulting to 1.
fn colspan(cell: ElementRef<'_>) -> usize {
    cell.value()
        .attr("colspan")
        .map(|s| s.trim().chars().take_while(char::is_ascii_digit).collect::<String>())
        .and_then(|digits| digits.parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_COLSPAN)
}

/// Text of an `<li>`, excluding any lists nested inside it.
fn text_outside_lists(element: ElementRef<'_>, out: &mut String) {
    flat_text(element, out, true);
}

/// Concatenate the text nodes under `element`. Inline tags add nothing, so
/// `H<sub>2</sub>O` stays one word; `<br>` and block children separate
/// their neighbours with a space.
fn flat_text(element: ElementRef<'_>, out: &mut String, skip_lists: bool) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            let name = child_element.value().name();
            if skip_lists && matches!(name, "ul" | "ol") {
                continue;
            }
            if name == "br" {
                out.push(' ');
            } else if is_block(name) {
                out.push(' ');
                flat_text(child_element, out, skip_lists);
                out.push(' ');
            } else {
                flat_text(child_element, out, skip_lists);
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "div"
            | "section"
            | "article"
            | "header"
            | "footer"
            | "blockquote"
            | "pre"
            | "ul"
            | "ol"
            | "li"
            | "dl"
            | "dt"
            | "dd"
            | "table"
            | "tr"
            | "td"
            | "th"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "figure"
            | "figcaption"
            | "hr"
    )
}

/// Outermost `<ul>`/`<ol>` descendants of an element.
fn nested_lists(element: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut found = Vec::new();
    for child in element.children().filter_map(ElementRef::wrap) {
        if matches!(child.value().name(), "ul" | "ol") {
            found.push(child);
        } else {
            found.extend(nested_lists(child));
        }
    }
    found
}

fn normalized_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    flat_text(element, &mut out, false);
    collapse_whitespace(&out)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn para(text: &str, style: ParagraphStyle) -> Block {
        Block::Paragraph(Paragraph {
            text: text.to_string(),
            style,
        })
    }

    #[test]
    fn headings_and_paragraphs() {
        let doc = convert_markup("<h2>  Title </h2><p>  Hello \n  world </p><p>   </p>");
        assert_eq!(
            doc.blocks,
            vec![
                para("Title", ParagraphStyle::Heading(2)),
                para("Hello world", ParagraphStyle::Body),
            ]
        );
    }

    #[test]
    fn inline_formatting_is_flattened() {
        let doc = convert_markup("<p>Some <b>bold</b> and <em>italic</em> text</p>");
        assert_eq!(doc.blocks, vec![para("Some bold and italic text", ParagraphStyle::Body)]);
    }

    #[test]
    fn inline_tags_do_not_split_words() {
        let doc = convert_markup(
            "<p>Hello <b>world</b>.</p><h3>H<sub>2</sub>O and x<sup>2</sup></h3>\
             <ul><li>bo<i>ld</i> item</li></ul><div>bo<i>ld</i></div>",
        );
        assert_eq!(
            doc.blocks,
            vec![
                para("Hello world.", ParagraphStyle::Body),
                para("H2O and x2", ParagraphStyle::Heading(3)),
                para(
                    "bold item",
                    ParagraphStyle::ListItem {
                        ordered: false,
                        depth: 0
                    }
                ),
                para("bold", ParagraphStyle::Body),
            ]
        );
    }

    #[test]
    fn breaks_and_block_children_separate_words() {
        let doc = convert_markup(
            "<p>line one<br>line two</p><table><tr><td>a<p>b</p>c</td><td>wor<b>d</b></td></tr></table>",
        );
        assert_eq!(doc.blocks[0], para("line one line two", ParagraphStyle::Body));
        let tables: Vec<_> = doc.tables().collect();
        assert_eq!(tables[0].rows, vec![vec!["a b c".to_string(), "word".to_string()]]);
    }

    #[test]
    fn loose_text_becomes_paragraphs() {
        let doc = convert_markup("<div>Intro <b>bold</b> text<p>Para</p>tail</div>");
        assert_eq!(
            doc.blocks,
            vec![
                para("Intro bold text", ParagraphStyle::Body),
                para("Para", ParagraphStyle::Body),
                para("tail", ParagraphStyle::Body),
            ]
        );
    }

    #[test]
    fn nested_lists_carry_depth() {
        let doc = convert_markup(
            "<ul><li>One<ul><li>Inner</li></ul></li><li>Two</li></ul><ol><li>First</li></ol>",
        );
        let unordered = |depth| ParagraphStyle::ListItem {
            ordered: false,
            depth,
        };
        assert_eq!(
            doc.blocks,
            vec![
                para("One", unordered(0)),
                para("Inner", unordered(1)),
                para("Two", unordered(0)),
                para(
                    "First",
                    ParagraphStyle::ListItem {
                        ordered: true,
                        depth: 0
                    }
                ),
            ]
        );
    }

    #[test]
    fn table_grid_is_rectangular() {
        let doc = convert_markup(
            "<table><thead><tr><th>A</th><th> B </th></tr></thead>\
             <tbody><tr><td colspan=\"2\">wide</td></tr><tr><td>x</td></tr></tbody></table>",
        );
        let tables: Vec<_> = doc.tables().collect();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].num_cols, 2);
        assert_eq!(
            tables[0].rows,
            vec![
                vec!["A".to_string(), "B".to_string()],
                vec!["wide".to_string(), String::new()],
                vec!["x".to_string(), String::new()],
            ]
        );
    }

    #[test]
    fn degenerate_tables_are_skipped() {
        let doc = convert_markup("<table></table><table><tr></tr></table><p>after</p>");
        assert_eq!(doc.tables().count(), 0);
        assert_eq!(doc.blocks, vec![para("after", ParagraphStyle::Body)]);
    }

    #[test]
    fn pre_keeps_line_breaks() {
        let doc = convert_markup("<pre>\nline one\n  line two  \n</pre>");
        assert_eq!(
            doc.blocks,
            vec![para("line one\n  line two", ParagraphStyle::Preformatted)]
        );
    }

    #[test]
    fn head_and_scripts_are_ignored() {
        let doc = convert_markup(
            "<html><head><title>T</title><style>p{}</style></head>\
             <body><script>var x;</script><p>Body</p></body></html>",
        );
        assert_eq!(doc.blocks, vec![para("Body", ParagraphStyle::Body)]);
    }

    #[test]
    fn assembled_pages_convert_in_order() {
        use crate::output::PageResult;
        use crate::pipeline::assemble::assemble;

        let pages = vec![
            PageResult {
                body: "<h1>One</h1>".into(),
                ..PageResult::empty(0)
            },
            PageResult::empty(1),
            PageResult {
                body: "<p>Three</p>".into(),
                ..PageResult::empty(2)
            },
        ];
        let doc = convert(&assemble(&pages, Some("Ignored title")).unwrap());
        assert_eq!(
            doc.blocks,
            vec![
                para("One", ParagraphStyle::Heading(1)),
                para("Three", ParagraphStyle::Body),
            ]
        );
    }
}
