//! Charset handling for plain-text documents. Court filings arrive in
//! whatever encoding the originating system produced; everything is
//! normalized to UTF-8 on the way in. UTF-16 without a BOM is detected only
//! as well as the statistical detector manages.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use unicode_bom::Bom;

/// Determine the encoding of `buffer`, preferring a BOM when present and
/// falling back to statistical detection.
pub fn detect_encoding(buffer: &[u8]) -> &'static Encoding {
    let from_bom = match Bom::from(buffer) {
        Bom::Utf8 => Some(UTF_8),
        Bom::Utf16Be => Some(encoding_rs::UTF_16BE),
        Bom::Utf16Le => Some(encoding_rs::UTF_16LE),
        _ => None,
    };

    let result = from_bom.unwrap_or_else(|| {
        let mut detector = EncodingDetector::new();
        detector.feed(buffer, true);
        detector.guess(None, true)
    });
    tracing::debug!(
        encoding = result.name(),
        from_bom = from_bom.is_some(),
        "detected text encoding"
    );
    result
}

/// Decode `buffer` to UTF-8, removing any BOM. Malformed sequences become
/// replacement characters rather than failing the document; the warning is
/// the only trace they leave.
pub fn decode_text(buffer: &[u8]) -> String {
    let encoding = detect_encoding(buffer);
    let (text, _, had_errors) = encoding.decode(buffer);
    if had_errors {
        tracing::warn!(
            encoding = encoding.name(),
            "text contained malformed byte sequences; replaced"
        );
    }
    text.into_owned()
}
