//! Document assembly: ordered page bodies in, one HTML document out.
//!
//! Every page gets its own `<section class="page" data-page="N">` even when
//! its body is empty, so a failed page still shows up as a gap in the right
//! place rather than vanishing.

use crate::error::Text2DocError;
use crate::output::{AssembledDocument, PageResult};

const DEFAULT_TITLE: &str = "Converted document";

/// Wrap page bodies in document scaffolding.
///
/// `results` must be ordered by page index with no gaps; anything else is
/// rejected with [`Text2DocError::InvalidPages`].
pub fn assemble(results: &[PageResult], title: Option<&str>) -> Result<AssembledDocument, Text2DocError> {
    for (expected, result) in results.iter().enumerate() {
        if result.page_index != expected {
            return Err(Text2DocError::InvalidPages {
                detail: format!(
                    "page result at position {expected} has index {}",
                    result.page_index
                ),
            });
        }
    }

    let body_len: usize = results.iter().map(|r| r.body.len() + 48).sum();
    let mut out = String::with_capacity(body_len + 256);

    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str("<title>");
    out.push_str(&html_escape(title.unwrap_or(DEFAULT_TITLE)));
    out.push_str("</title>\n</head>\n<body>\n");

    for result in results {
        out.push_str(&format!(
            "<section class=\"page\" data-page=\"{}\">\n",
            result.page_num()
        ));
        if !result.body.is_empty() {
            out.push_str(&result.body);
            out.push('\n');
        }
        out.push_str("</section>\n");
    }

    out.push_str("</body>\n</html>\n");
    Ok(AssembledDocument::new(out))
}

/// Escape text for use in HTML element content or attribute values.
pub(crate) fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(index: usize, body: &str) -> PageResult {
        PageResult {
            body: body.to_string(),
            ..PageResult::empty(index)
        }
    }

    #[test]
    fn sections_follow_page_order() {
        let doc = assemble(&[page(0, "<p>one</p>"), page(1, ""), page(2, "<p>three</p>")], None).unwrap();
        let s = doc.as_str();
        assert!(s.starts_with("<!DOCTYPE html>"));
        assert!(s.trim_end().ends_with("</html>"));

        let one = s.find("<p>one</p>").unwrap();
        let two = s.find("data-page=\"2\"").unwrap();
        let three = s.find("<p>three</p>").unwrap();
        assert!(one < two && two < three);
        assert!(s.contains("<section class=\"page\" data-page=\"2\">\n</section>"));
        assert_eq!(s.matches("<section").count(), 3);
    }

    #[test]
    fn gap_is_rejected() {
        let err = assemble(&[page(0, "a"), page(2, "c")], None).unwrap_err();
        assert!(matches!(err, Text2DocError::InvalidPages { .. }));
    }

    #[test]
    fn title_is_escaped() {
        let doc = assemble(&[], Some("Q&A <draft>")).unwrap();
        assert!(doc.as_str().contains("<title>Q&amp;A &lt;draft&gt;</title>"));
    }

    #[test]
    fn empty_input_is_bare_scaffolding() {
        let doc = assemble(&[], None).unwrap();
        assert!(!doc.as_str().contains("<section"));
        assert!(doc.as_str().contains("<body>"));
    }

    #[test]
    fn escape_covers_quotes() {
        assert_eq!(html_escape(r#"a"b'c"#), "a&quot;b&#39;c");
    }
}
