//! Post-processing: deterministic cleanup of generated HTML fragments.
//!
//! Models asked for "an HTML fragment, no fences" still sometimes answer with
//! a ```` ```html ```` block or a complete `<html><body>…` document. Every
//! fragment is later wrapped in a page `<section>`, so those wrappers must go.
//!
//! ## Rule Order
//!
//! Fences are stripped before line endings are normalised (the fence regex
//! tolerates both), and wrappers are removed before whitespace cleanup so the
//! blank lines they leave behind are collapsed too.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all post-processing rules to one generated fragment.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Remove document wrappers (`<!DOCTYPE>`, `<html>`, `<head>…</head>`, `<body>`)
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive newlines down to 2
/// 6. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, etc.)
/// 7. Trim leading/trailing whitespace
pub fn clean_fragment(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = strip_document_wrappers(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove document wrappers ─────────────────────────────────────────

static RE_HEAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<head\b[^>]*>.*?</head\s*>").unwrap());

static RE_WRAPPER_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<!doctype[^>]*>|</?html\b[^>]*>|</?body\b[^>]*>").unwrap());

fn strip_document_wrappers(input: &str) -> String {
    let s = RE_HEAD.replace_all(input, "");
    RE_WRAPPER_TAGS.replace_all(&s, "").to_string()
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 6: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}
