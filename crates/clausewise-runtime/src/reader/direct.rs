//! In-process text extraction.
//!
//! Handles plain-text documents and PDFs whose content streams are stored
//! uncompressed. Anything else is left to the external tools.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::bytes::Regex;

use clausewise_core::TOOL_DIRECT_TEXT;

use super::tools::ExtractionTool;
use super::ReaderError;

lazy_static! {
    /// `(literal) Tj` and `(literal) '` show-text operators
    static ref PDF_TJ: Regex = Regex::new(r"\(((?:[^()\\]|\\.)*)\)\s*(?:Tj|')").unwrap();

    /// `[ (a) -120 (b) ] TJ` arrays
    static ref PDF_TJ_ARRAY: Regex = Regex::new(r"\[((?:[^\]\\]|\\.)*)\]\s*TJ").unwrap();

    static ref PDF_ARRAY_LITERAL: Regex = Regex::new(r"\(((?:[^()\\]|\\.)*)\)").unwrap();

    /// Text-showing operators and the text-block end, in document order
    static ref PDF_TEXT_OPS: Regex = Regex::new(
        r"\(((?:[^()\\]|\\.)*)\)\s*(?:Tj|')|\[((?:[^\]\\]|\\.)*)\]\s*TJ|(?:^|\s)(ET|T\*|Td|TD)(?:\s|$)"
    ).unwrap();
}

const PDF_MAGIC: &[u8] = b"%PDF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Reads text layers directly from the bytes.
///
/// Retries (`attempt > 0`) decode non-UTF-8 input lossily instead of
/// rejecting it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectTextTool;

impl DirectTextTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExtractionTool for DirectTextTool {
    fn name(&self) -> &str {
        TOOL_DIRECT_TEXT
    }

    async fn extract(
        &self,
        bytes: &[u8],
        _hint: Option<&str>,
        attempt: u32,
    ) -> Result<String, ReaderError> {
        if bytes.starts_with(PDF_MAGIC) {
            return pdf_text(bytes);
        }
        if bytes.starts_with(ZIP_MAGIC) {
            return Err(ReaderError::UnsupportedFormat(
                "zip container needs a format-specific converter".to_string(),
            ));
        }

        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) if attempt > 0 => String::from_utf8_lossy(bytes).into_owned(),
            Err(e) => {
                return Err(ReaderError::UnsupportedFormat(format!(
                    "not UTF-8 text ({})",
                    e
                )))
            }
        };

        if text.trim().is_empty() {
            return Err(ReaderError::ExtractionFailed("document is empty".to_string()));
        }
        Ok(text)
    }
}

/// Pull literal strings out of PDF text operators.
fn pdf_text(bytes: &[u8]) -> Result<String, ReaderError> {
    let mut out = String::new();
    for caps in PDF_TEXT_OPS.captures_iter(bytes) {
        if let Some(literal) = caps.get(1) {
            out.push_str(&unescape(literal.as_bytes()));
        } else if let Some(array) = caps.get(2) {
            for part in PDF_ARRAY_LITERAL.captures_iter(array.as_bytes()) {
                if let Some(literal) = part.get(1) {
                    out.push_str(&unescape(literal.as_bytes()));
                }
            }
        } else if !out.ends_with('\n') && !out.is_empty() {
            out.push('\n');
        }
    }

    if out.trim().is_empty() {
        let reason = if PDF_TJ.is_match(bytes) || PDF_TJ_ARRAY.is_match(bytes) {
            "text operators contain no characters"
        } else {
            "no uncompressed text layer"
        };
        return Err(ReaderError::ExtractionFailed(reason.to_string()));
    }
    Ok(out)
}

/// Decode PDF literal-string escapes.
fn unescape(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len());
    let mut iter = raw.iter().copied().peekable();
    while let Some(b) = iter.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match iter.next() {
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b't') => out.push(b'\t'),
            Some(b'b') => out.push(0x08),
            Some(b'f') => out.push(0x0C),
            Some(d @ b'0'..=b'7') => {
                let mut value = u32::from(d - b'0');
                for _ in 0..2 {
                    match iter.peek() {
                        Some(&n @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(n - b'0');
                            iter.next();
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
            }
            // Line continuation
            Some(b'\n') => {}
            Some(other) => out.push(other),
            None => {}
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plain_text() {
        let text = DirectTextTool
            .extract(b"\xEF\xBB\xBFThis Agreement is made...", None, 0)
            .await
            .unwrap();
        assert_eq!(text, "This Agreement is made...");
    }

    #[tokio::test]
    async fn test_invalid_utf8_rejected_then_lossy_on_retry() {
        let bytes = b"Agreement \xFF\xFE between parties";
        let first = DirectTextTool.extract(bytes, None, 0).await;
        assert!(matches!(first, Err(ReaderError::UnsupportedFormat(_))));

        let retry = DirectTextTool.extract(bytes, None, 1).await.unwrap();
        assert!(retry.starts_with("Agreement"));
        assert!(retry.ends_with("between parties"));
    }

    #[tokio::test]
    async fn test_pdf_text_operators() {
        let pdf = b"%PDF-1.4\n1 0 obj << >> stream\nBT /F1 12 Tf 72 712 Td (1. Termination\\051 Either) Tj T* [(party ) -120 (may terminate.)] TJ ET\nendstream";
        let text = DirectTextTool.extract(pdf, Some("pdf"), 0).await.unwrap();
        assert_eq!(text, "1. Termination) Either\nparty may terminate.\n");
    }

    #[tokio::test]
    async fn test_scanned_pdf_fails() {
        let pdf = b"%PDF-1.4\n1 0 obj << /Filter /FlateDecode >> stream\nx\x9c\x01\x02endstream";
        let err = DirectTextTool.extract(pdf, Some("pdf"), 0).await.unwrap_err();
        assert_eq!(
            err,
            ReaderError::ExtractionFailed("no uncompressed text layer".to_string())
        );
    }

    #[tokio::test]
    async fn test_zip_is_unsupported() {
        let err = DirectTextTool
            .extract(b"PK\x03\x04word/document.xml", Some("docx"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ReaderError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_octal_escape() {
        assert_eq!(unescape(b"caf\\351"), "caf\u{FFFD}");
        assert_eq!(unescape(b"a\\(b\\)"), "a(b)");
    }
}
