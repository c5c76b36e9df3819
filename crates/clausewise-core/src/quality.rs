//! Text quality heuristics and document-kind sniffing.
//!
//! Both are deterministic byte/string inspections used by the reader tools
//! and the adaptive router; nothing here decodes a document.

use serde::{Deserialize, Serialize};

use crate::state::DocumentKind;

/// Thresholds a tool's output must meet to count as usable text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Minimum number of non-whitespace characters
    pub min_chars: usize,

    /// Minimum share of printable characters, 0.0..=1.0
    pub min_printable_ratio: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_chars: 64,
            min_printable_ratio: 0.9,
        }
    }
}

/// Verdict of the quality evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextQuality {
    Satisfactory,
    LowConfidence(String),
}

impl TextQuality {
    pub fn is_satisfactory(&self) -> bool {
        matches!(self, TextQuality::Satisfactory)
    }
}

/// Judge whether extracted text is usable.
pub fn assess_text(text: &str, thresholds: &QualityThresholds) -> TextQuality {
    if text.trim().is_empty() {
        return TextQuality::LowConfidence("no text".to_string());
    }

    let visible = text.chars().filter(|c| !c.is_whitespace()).count();
    if visible < thresholds.min_chars {
        return TextQuality::LowConfidence(format!(
            "only {} visible characters (minimum {})",
            visible, thresholds.min_chars
        ));
    }

    let total = text.chars().count();
    let printable = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .count();
    let ratio = printable as f64 / total as f64;

    if ratio < thresholds.min_printable_ratio {
        return TextQuality::LowConfidence(format!(
            "printable ratio {:.2} below {:.2}",
            ratio, thresholds.min_printable_ratio
        ));
    }

    TextQuality::Satisfactory
}

const PDF_MAGIC: &[u8] = b"%PDF";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Guess the document kind from its leading bytes and an optional hint.
pub fn sniff_kind(bytes: &[u8], hint: Option<&str>) -> DocumentKind {
    if bytes.starts_with(PDF_MAGIC) {
        return if has_pdf_text_operators(bytes) {
            DocumentKind::PdfText
        } else {
            DocumentKind::PdfScanned
        };
    }

    let hint = hint.map(|h| h.trim().trim_start_matches('.').to_lowercase());
    if bytes.starts_with(ZIP_MAGIC) {
        let docx_hint = hint
            .as_deref()
            .is_some_and(|h| h == "docx" || h.contains("wordprocessingml"));
        if docx_hint || contains(bytes, b"word/") {
            return DocumentKind::Docx;
        }
    }

    match hint.as_deref() {
        Some("pdf") | Some("application/pdf") => DocumentKind::PdfScanned,
        _ => DocumentKind::Unknown,
    }
}

/// Refine the kind once a tool has produced text for it.
///
/// A "scanned" PDF that yielded text without OCR actually carries a text
/// layer.
pub fn refine_kind(kind: DocumentKind, tool: &str) -> DocumentKind {
    match (kind, tool) {
        (DocumentKind::PdfScanned, "direct-text") => DocumentKind::PdfText,
        _ => kind,
    }
}

fn has_pdf_text_operators(bytes: &[u8]) -> bool {
    contains(bytes, b"BT") && (contains(bytes, b"Tj") || contains(bytes, b"TJ"))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
