//! Input resolution: turn a user-supplied path or URL into ordered [`Page`]s.
//!
//! Three shapes of input are accepted:
//!
//! * a UTF-8 text file, pages separated by form feed (`\x0C`), which is what
//!   `pdftotext` and most OCR exporters emit;
//! * a directory of `*.txt` files, one page per file, ordered by file name;
//! * an `http://` / `https://` URL to a text file of the first kind.
//!
//! Text extraction itself happens upstream; this module never looks inside
//! binary formats. Bytes that are not UTF-8 are rejected with
//! [`Text2DocError::NotText`].

use crate::error::Text2DocError;
use crate::output::Page;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const PAGE_BREAK: char = '\x0C';

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input` to its pages.
///
/// Errors are fatal: missing or unreadable input, non-text content, failed
/// downloads, and inputs that contain no pages at all.
pub async fn resolve_pages(input: &str, download_timeout_secs: u64) -> Result<Vec<Page>, Text2DocError> {
    let input = input.trim();
    if input.is_empty() || (input.contains("://") && !is_url(input)) {
        return Err(Text2DocError::InvalidInput {
            input: input.to_string(),
        });
    }

    let pages = if is_url(input) {
        download_pages(input, download_timeout_secs).await?
    } else {
        let path = PathBuf::from(input);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        if meta.is_dir() {
            read_page_dir(&path).await?
        } else {
            let bytes = tokio::fs::read(&path).await.map_err(|e| io_error(&path, e))?;
            split_pages(&decode(&path, bytes)?)
        }
    };

    if pages.is_empty() {
        return Err(Text2DocError::NoPages {
            input: input.to_string(),
        });
    }
    info!("Resolved {} pages from {}", pages.len(), input);
    Ok(pages)
}

/// Split form-feed separated text into pages.
///
/// A blank piece after the last form feed is a terminator, not a page, and
/// is dropped. Blank pages in the middle are kept.
pub fn split_pages(text: &str) -> Vec<Page> {
    let mut pieces: Vec<&str> = text.split(PAGE_BREAK).collect();
    if pieces.last().is_some_and(|p| p.trim().is_empty()) {
        pieces.pop();
    }
    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| Page::new(index, text))
        .collect()
}

/// One page per `*.txt` file, ordered by file name.
async fn read_page_dir(dir: &Path) -> Result<Vec<Page>, Text2DocError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| io_error(dir, e))?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(dir, e))? {
        let path = entry.path();
        let is_txt = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("txt"));
        if is_txt && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!("Found {} page files in {}", files.len(), dir.display());

    let mut pages = Vec::with_capacity(files.len());
    for (index, path) in files.into_iter().enumerate() {
        let bytes = tokio::fs::read(&path).await.map_err(|e| io_error(&path, e))?;
        pages.push(Page::new(index, decode(&path, bytes)?));
    }
    Ok(pages)
}

async fn download_pages(url: &str, timeout_secs: u64) -> Result<Vec<Page>, Text2DocError> {
    info!("Downloading text from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Text2DocError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let download_error = |e: reqwest::Error| {
        if e.is_timeout() {
            Text2DocError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Text2DocError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(download_error)?;
    if !response.status().is_success() {
        return Err(Text2DocError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(download_error)?;
    debug!("Downloaded {} bytes", bytes.len());
    Ok(split_pages(&decode(Path::new(url), bytes.to_vec())?))
}

fn decode(path: &Path, bytes: Vec<u8>) -> Result<String, Text2DocError> {
    let mut text = String::from_utf8(bytes).map_err(|e| Text2DocError::NotText {
        path: path.to_path_buf(),
        detail: e.utf8_error().to_string(),
    })?;
    if text.starts_with('\u{FEFF}') {
        text.drain(..'\u{FEFF}'.len_utf8());
    }
    Ok(text)
}

fn io_error(path: &Path, e: std::io::Error) -> Text2DocError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => Text2DocError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Text2DocError::FileNotFound {
            path: path.to_path_buf(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.txt"));
        assert!(is_url("http://example.com/doc.txt"));
        assert!(!is_url("/tmp/doc.txt"));
        assert!(!is_url("doc.txt"));
        assert!(!is_url(""));
    }

    #[test]
    fn split_on_form_feed() {
        let pages = split_pages("one\x0Ctwo\x0C\x0Cfour\x0C");
        let texts: Vec<_> = pages.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "", "four"]);
        assert_eq!(pages[3].index, 3);
    }

    #[test]
    fn text_without_form_feed_is_one_page() {
        let pages = split_pages("just one page.");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text, "just one page.");
    }

    #[test]
    fn blank_text_has_no_pages() {
        assert!(split_pages("").is_empty());
        assert!(split_pages("  \n").is_empty());
    }

    #[tokio::test]
    async fn reads_form_feed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "\u{FEFF}alpha\x0Cbeta\x0C").unwrap();

        let pages = resolve_pages(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].text, "alpha");
        assert_eq!(pages[1].text, "beta");
    }

    #[tokio::test]
    async fn reads_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("page-02.txt"), "second").unwrap();
        std::fs::write(dir.path().join("page-01.txt"), "first").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let pages = resolve_pages(dir.path().to_str().unwrap(), 5).await.unwrap();
        let texts: Vec<_> = pages.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn missing_file_is_fatal() {
        let err = resolve_pages("/definitely/not/here.txt", 5).await.unwrap_err();
        assert!(matches!(err, Text2DocError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn binary_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, [0x25, 0x50, 0x44, 0x46, 0xFF, 0xFE, 0x00]).unwrap();

        let err = resolve_pages(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, Text2DocError::NotText { .. }));
    }

    #[tokio::test]
    async fn empty_file_has_no_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "").unwrap();

        let err = resolve_pages(path.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, Text2DocError::NoPages { .. }));
    }

    #[tokio::test]
    async fn unsupported_scheme_is_invalid() {
        let err = resolve_pages("ftp://example.com/doc.txt", 5).await.unwrap_err();
        assert!(matches!(err, Text2DocError::InvalidInput { .. }));
    }
}
