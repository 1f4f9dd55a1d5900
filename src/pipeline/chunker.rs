//! Sentence-bounded chunking of page text.
//!
//! Text is split on `.` and sentences are packed greedily into chunks of at
//! most `max_chars` characters. A sentence longer than `max_chars` becomes a
//! chunk on its own; it is never truncated.
//!
//! Each sentence gets its `.` back, so concatenating the chunks of a page
//! reproduces the page text. The one lossy case: text that does not end in
//! `.` gains a trailing `.` on its last sentence.

use crate::output::{Chunk, Page};

const TERMINATOR: char = '.';

/// Cut a page into ordered chunks.
pub fn chunk_page(page: &Page, max_chars: usize) -> Vec<Chunk> {
    split_text(&page.text, max_chars)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| Chunk {
            page_index: page.index,
            chunk_index,
            text,
        })
        .collect()
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Empty text yields no chunks. The trailing non-empty accumulator is always
/// flushed.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut pieces: Vec<&str> = text.split(TERMINATOR).collect();
    // "a. b." splits into ["a", " b", ""]; the final "" is not a sentence.
    if text.ends_with(TERMINATOR) {
        pieces.pop();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in pieces {
        let sentence_len = sentence.chars().count();
        if current_len + sentence_len < max_chars || current.is_empty() {
            current.push_str(sentence);
            current.push(TERMINATOR);
            current_len += sentence_len + 1;
        } else {
            chunks.push(std::mem::take(&mut current));
            current.push_str(sentence);
            current.push(TERMINATOR);
            current_len = sentence_len + 1;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence_count(chunk: &str) -> usize {
        chunk.matches(TERMINATOR).count()
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_text("", 50).is_empty());
    }

    #[test]
    fn text_without_terminator_gains_one() {
        assert_eq!(split_text("no full stop here", 50), vec!["no full stop here."]);
    }

    #[test]
    fn short_text_is_one_chunk() {
        let text = "One. Two. Three.";
        assert_eq!(split_text(text, 100), vec![text.to_string()]);
    }

    #[test]
    fn chunks_respect_bound_unless_single_sentence() {
        let text = "Alpha beta gamma. Delta epsilon. A much longer sentence that clearly \
                    exceeds the tiny bound on its own. Zeta. Eta theta iota kappa. Lambda.";
        let max = 20;
        for chunk in split_text(text, max) {
            let len = chunk.chars().count();
            assert!(
                len <= max || sentence_count(&chunk) == 1,
                "chunk of {len} chars holds several sentences: {chunk:?}"
            );
        }
    }

    #[test]
    fn oversized_sentence_is_not_truncated() {
        let long = "x".repeat(120);
        let text = format!("Short. {long}. Tail.");
        let chunks = split_text(&text, 30);
        assert!(chunks.iter().any(|c| c.contains(&long)));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn joined_chunks_reproduce_text() {
        let text = "The quick brown fox. Jumps over. The lazy dog sleeps in the sun. \
                    Meanwhile the cat watches. Nothing happens.";
        for max in [5, 20, 40, 1000] {
            assert_eq!(split_text(text, max).concat(), text, "max = {max}");
        }
    }

    #[test]
    fn empty_sentences_between_terminators_survive() {
        let text = "Wait... what.";
        assert_eq!(split_text(text, 100).concat(), text);
    }

    #[test]
    fn bound_counts_characters_not_bytes() {
        // 8 chars each but 16 bytes; with a 20-char bound both fit.
        let text = "éééééééé.éééééééé.";
        assert_eq!(split_text(text, 20).len(), 1);
    }

    #[test]
    fn chunk_page_numbers_chunks_in_order() {
        let page = Page::new(2, "First part here. Second part here. Third part here.");
        let chunks = chunk_page(&page, 20);
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.page_index, 2);
            assert_eq!(c.chunk_index, i);
        }
        assert_eq!(chunks[0].text, "First part here.");
    }
}
