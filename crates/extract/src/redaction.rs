//! Redaction analysis. This inspects extracted text for the artifacts
//! redaction tooling leaves behind; it shares the extractor but is served by
//! its own endpoint and never participates in the processing pipeline.

use lazy_static::lazy_static;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionKind {
    /// Runs of block glyphs (█ ▓ ▆) burned into the text layer.
    BlockGlyphs,
    /// Explicit textual markers: [REDACTED], [SEALED], (REDACTED), etc.
    Tagged,
    /// Long runs of X or underscore placeholders.
    Placeholder,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RedactionSpan {
    pub kind: RedactionKind,
    /// Byte offsets into the analyzed text.
    pub start: usize,
    pub end: usize,
    pub excerpt: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RedactionReport {
    pub spans: Vec<RedactionSpan>,
    pub redacted_chars: u64,
    /// Confidence that the document actually contains redactions.
    pub confidence: f64,
    pub recommendations: Vec<String>,
}

lazy_static! {
    static ref BLOCK_GLYPHS: Regex =
        Regex::new(r"[\u{2580}-\u{259f}\u{25a0}\u{25ae}]{2,}").unwrap();
    static ref TAGGED: Regex = Regex::new(
        r"(?i)[\[(](?:redacted|sealed|withheld|confidential(?:\s+-\s+)?(?:\s*under\s+seal)?)[\])]"
    )
    .unwrap();
    static ref PLACEHOLDER: Regex = Regex::new(r"(?:X{5,}|_{5,}|\*{5,})").unwrap();
}

pub fn analyze_redactions(text: &str) -> RedactionReport {
    let mut spans = Vec::new();
    collect(&BLOCK_GLYPHS, RedactionKind::BlockGlyphs, text, &mut spans);
    collect(&TAGGED, RedactionKind::Tagged, text, &mut spans);
    collect(&PLACEHOLDER, RedactionKind::Placeholder, text, &mut spans);
    spans.sort_by_key(|span| span.start);

    let redacted_chars: u64 = spans.iter().map(|s| (s.end - s.start) as u64).sum();
    let confidence = confidence_for(&spans, text);
    let recommendations = recommendations_for(&spans, confidence);

    RedactionReport {
        spans,
        redacted_chars,
        confidence,
        recommendations,
    }
}

fn collect(pattern: &Regex, kind: RedactionKind, text: &str, spans: &mut Vec<RedactionSpan>) {
    for found in pattern.find_iter(text) {
        spans.push(RedactionSpan {
            kind,
            start: found.start(),
            end: found.end(),
            excerpt: context_excerpt(text, found.start(), found.end()),
        });
    }
}

/// Up to 40 bytes of surrounding context, clamped to char boundaries.
fn context_excerpt(text: &str, start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(20);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + 20).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].to_string()
}

fn confidence_for(spans: &[RedactionSpan], text: &str) -> f64 {
    if spans.is_empty() || text.is_empty() {
        return 0.0;
    }
    // Tagged markers are near-certain; glyph and placeholder runs gain
    // confidence with repetition.
    let tagged = spans.iter().filter(|s| s.kind == RedactionKind::Tagged).count();
    let base: f64 = if tagged > 0 { 0.9 } else { 0.5 };
    (base + 0.05 * (spans.len().saturating_sub(1)) as f64).min(0.99)
}

fn recommendations_for(spans: &[RedactionSpan], confidence: f64) -> Vec<String> {
    let mut out = Vec::new();
    if spans.is_empty() {
        out.push("No redaction artifacts were detected in the text layer.".to_string());
        return out;
    }
    out.push(format!(
        "Found {} redaction artifact(s); review before public release.",
        spans.len()
    ));
    if spans.iter().any(|s| s.kind == RedactionKind::BlockGlyphs) {
        out.push(
            "Block glyphs persist in the text layer; verify the underlying \
             content was removed, not just covered."
                .to_string(),
        );
    }
    if confidence < 0.6 {
        out.push("Low-confidence matches; manual inspection recommended.".to_string());
    }
    out
}
