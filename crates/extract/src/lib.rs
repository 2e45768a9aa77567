mod docx;
mod encoding;
mod pdf;
mod redaction;
mod rtf;

pub use encoding::{decode_text, detect_encoding};
pub use pdf::PdfTooling;
pub use redaction::{analyze_redactions, RedactionKind, RedactionReport, RedactionSpan};

use std::path::PathBuf;

/// Error type returned by all extraction operations.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unable to determine the document format; explicit content type required")]
    CannotInferFormat,

    #[error("unsupported format: '{0}'")]
    Unsupported(String),

    #[error("document appears corrupted: {0}")]
    Corrupted(String),

    #[error("pdf tooling is unavailable: {0}")]
    MissingTool(String),

    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// Terminal errors fail the document; everything else is retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExtractError::CannotInferFormat
                | ExtractError::Unsupported(_)
                | ExtractError::Corrupted(_)
                | ExtractError::MissingTool(_)
        )
    }
}

/// The formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pdf,
    Docx,
    Txt,
    Rtf,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Format::Pdf => "pdf",
            Format::Docx => "docx",
            Format::Txt => "txt",
            Format::Rtf => "rtf",
        };
        f.write_str(name)
    }
}

/// The result of a successful extraction. Zero-length text is a valid
/// outcome (scanned documents); the pipeline advances it with a
/// low-confidence classification instead of failing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Extraction {
    pub text: String,
    pub word_count: u64,
    pub char_count: u64,
    pub page_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub pdftotext_path: PathBuf,
    pub pdfinfo_path: PathBuf,
    /// Upper bound on extracted text held in memory per document. Longer
    /// documents are truncated at a character boundary.
    pub max_text_bytes: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            pdftotext_path: "pdftotext".into(),
            pdfinfo_path: "pdfinfo".into(),
            max_text_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Format-dispatching text extractor.
pub struct Extractor {
    config: ExtractConfig,
}

impl Extractor {
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    #[tracing::instrument(skip(self, content), fields(size = content.len()))]
    pub async fn extract(
        &self,
        content: &[u8],
        file_name: &str,
        content_type: &str,
    ) -> Result<Extraction, ExtractError> {
        let format = resolve_format(content_type, file_name)?;
        tracing::debug!(format = %format, "resolved document format");

        let (mut text, page_count) = match format {
            Format::Pdf => {
                let tooling = PdfTooling {
                    pdftotext: self.config.pdftotext_path.clone(),
                    pdfinfo: self.config.pdfinfo_path.clone(),
                };
                tooling.extract(content).await?
            }
            Format::Docx => docx::extract_docx(content)?,
            Format::Rtf => rtf::extract_rtf(content)?,
            Format::Txt => {
                let text = decode_text(content);
                let pages = text.matches('\u{c}').count() as u32 + 1;
                (text, pages)
            }
        };

        truncate_in_place(&mut text, self.config.max_text_bytes);

        let word_count = text.split_whitespace().count() as u64;
        let char_count = text.chars().count() as u64;
        let language = detect_language(&text);

        tracing::debug!(
            words = word_count,
            chars = char_count,
            pages = page_count,
            "extraction finished"
        );

        Ok(Extraction {
            text,
            word_count,
            char_count,
            page_count: page_count.max(1),
            language,
        })
    }
}

/// Dispatch on the declared content type first, falling back to the filename
/// extension.
pub fn resolve_format(content_type: &str, file_name: &str) -> Result<Format, ExtractError> {
    if let Some(format) = format_for_content_type(content_type) {
        return Ok(format);
    }
    if let Some(format) = format_for_file_extension(file_name) {
        return Ok(format);
    }
    if content_type.is_empty() && file_name.is_empty() {
        Err(ExtractError::CannotInferFormat)
    } else {
        Err(ExtractError::Unsupported(format!(
            "{content_type} ({file_name})"
        )))
    }
}

fn format_for_content_type(content_type: &str) -> Option<Format> {
    let essence = content_type
        .parse::<mime::Mime>()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|_| content_type.trim().to_ascii_lowercase());
    match essence.as_str() {
        "application/pdf" => Some(Format::Pdf),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
            Some(Format::Docx)
        }
        "text/plain" => Some(Format::Txt),
        "application/rtf" | "text/rtf" => Some(Format::Rtf),
        _ => None,
    }
}

fn format_for_file_extension(file_name: &str) -> Option<Format> {
    let extension = file_name.rsplit('.').next()?.to_ascii_lowercase();
    match extension.as_str() {
        "pdf" => Some(Format::Pdf),
        "docx" => Some(Format::Docx),
        "txt" | "text" | "log" => Some(Format::Txt),
        "rtf" => Some(Format::Rtf),
        _ => None,
    }
}

fn truncate_in_place(text: &mut String, max_bytes: usize) {
    if text.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    tracing::warn!(limit = max_bytes, "extracted text exceeds limit; truncating");
    text.truncate(cut);
}

/// A cheap stopword heuristic; the corpus is overwhelmingly English legal
/// text, so anything else is left unclassified.
fn detect_language(text: &str) -> Option<String> {
    if text.len() < 40 {
        return None;
    }
    let sample: Vec<&str> = text.split_whitespace().take(2_000).collect();
    if sample.is_empty() {
        return None;
    }
    let stopwords = ["the", "and", "of", "to", "in", "for", "that", "a"];
    let hits = sample
        .iter()
        .filter(|word| {
            let lowered = word.to_ascii_lowercase();
            stopwords.contains(&lowered.trim_matches(|c: char| !c.is_alphanumeric()))
        })
        .count();
    if hits * 100 / sample.len() >= 5 {
        Some("en".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn format_is_resolved_from_content_type_then_extension() {
        assert_eq!(
            resolve_format("application/pdf", "whatever.bin").unwrap(),
            Format::Pdf
        );
        assert_eq!(
            resolve_format("application/octet-stream", "motion.docx").unwrap(),
            Format::Docx
        );
        assert_eq!(
            resolve_format("text/plain; charset=utf-8", "notes").unwrap(),
            Format::Txt
        );
        assert!(matches!(
            resolve_format("application/x-msaccess", "db.mdb"),
            Err(ExtractError::Unsupported(_))
        ));
        assert!(matches!(
            resolve_format("", ""),
            Err(ExtractError::CannotInferFormat)
        ));
    }

    #[tokio::test]
    async fn plain_text_extraction_counts_words_and_pages() {
        let extractor = Extractor::new(ExtractConfig::default());
        let text = "The court finds the motion to dismiss is denied.\u{c}Page two of the order.";
        let extraction = extractor
            .extract(text.as_bytes(), "order.txt", "text/plain")
            .await
            .unwrap();

        assert_eq!(extraction.page_count, 2);
        assert_eq!(extraction.word_count, 14);
        assert_eq!(extraction.language.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn utf16_text_is_transcoded() {
        let extractor = Extractor::new(ExtractConfig::default());
        let mut bytes = vec![0xff, 0xfe];
        for unit in "order of the court".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let extraction = extractor
            .extract(&bytes, "order.txt", "text/plain")
            .await
            .unwrap();
        assert_eq!(extraction.text, "order of the court");
    }

    #[tokio::test]
    async fn oversized_text_is_truncated_at_a_char_boundary() {
        let extractor = Extractor::new(ExtractConfig {
            max_text_bytes: 10,
            ..ExtractConfig::default()
        });
        let extraction = extractor
            .extract("aaaaaaaaa\u{e9}xyz".as_bytes(), "a.txt", "text/plain")
            .await
            .unwrap();
        assert_eq!(extraction.text, "aaaaaaaaa");
    }

    #[test]
    fn short_or_foreign_text_gets_no_language() {
        assert_eq!(detect_language("too short"), None);
        assert_eq!(
            detect_language(
                "lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor"
            ),
            None
        );
    }
}
