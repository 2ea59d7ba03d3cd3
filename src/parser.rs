//! Extraction of the OCR and summary sections from a raw model reply.
//!
//! Grammar: a section is the text strictly between the first occurrence of its
//! start marker and the first occurrence of its end marker after that start
//! marker. Markers are literal and case-exact. Missing sections fall back to
//! fixed values; parsing never fails.

use crate::prompt::{OCR_END, OCR_START, SUMMARY_END, SUMMARY_START};

/// Stored when the reply has no summary section.
pub const SUMMARY_UNAVAILABLE: &str = "Resumo indisponível.";

/// Transcript and summary pulled from a reply. Both fields are always set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAnalysis {
    pub ocr_text: String,
    pub summary: String,
}

/// Parse a raw reply into its two sections, applying fallbacks.
pub fn parse(raw: &str) -> ParsedAnalysis {
    let ocr_text = extract_section(raw, OCR_START, OCR_END)
        .unwrap_or(raw)
        .trim()
        .to_string();

    let summary = extract_section(raw, SUMMARY_START, SUMMARY_END)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| SUMMARY_UNAVAILABLE.to_string());

    ParsedAnalysis { ocr_text, summary }
}

/// Two-pass scan: locate `start`, then the nearest `end` after it.
fn extract_section<'a>(raw: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let body_start = raw.find(start)? + start.len();
    let body_len = raw[body_start..].find(end)?;
    Some(&raw[body_start..body_start + body_len])
}
