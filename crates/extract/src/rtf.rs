//! A small RTF reader: control words that affect text are honored, styling
//! and destination groups (font tables, stylesheets, embedded objects) are
//! skipped wholesale. Legal filings in RTF are simple enough that this
//! covers them.

use super::ExtractError;

pub fn extract_rtf(content: &[u8]) -> Result<(String, u32), ExtractError> {
    // RTF is 7-bit ASCII with escapes; anything else arrives via \'hh.
    let source = String::from_utf8_lossy(content);
    let trimmed = source.trim_start();
    if !trimmed.starts_with("{\\rtf") {
        return Err(ExtractError::Corrupted(
            "missing {\\rtf header".to_string(),
        ));
    }

    let mut text = String::new();
    let mut page_count: u32 = 1;
    // Depth at which a skipped destination group started, if any.
    let mut skip_depth: Option<u32> = None;
    let mut depth: u32 = 0;
    // Number of fallback characters to swallow after a \uN escape.
    let mut unicode_skip: u32 = 0;

    let mut chars = trimmed.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if let Some(started) = skip_depth {
                    if depth < started {
                        skip_depth = None;
                    }
                }
            }
            '\\' => {
                let Some(&next) = chars.peek() else { break };
                if !next.is_ascii_alphabetic() && next != '\'' && next != '*' {
                    // Escaped literal: \{ \} \\ and friends.
                    chars.next();
                    if skip_depth.is_none() {
                        push_text(&mut text, next, &mut unicode_skip);
                    }
                    continue;
                }
                if next == '\'' {
                    chars.next();
                    let hex: String = [chars.next(), chars.next()]
                        .into_iter()
                        .flatten()
                        .collect();
                    if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                        if skip_depth.is_none() {
                            // Treat the byte as windows-1252, the de-facto
                            // default for legacy RTF.
                            let byte_buf = [byte];
                            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&byte_buf);
                            for ch in decoded.chars() {
                                push_text(&mut text, ch, &mut unicode_skip);
                            }
                        }
                    }
                    continue;
                }
                if next == '*' {
                    // \* marks an ignorable destination.
                    chars.next();
                    skip_depth.get_or_insert(depth);
                    continue;
                }

                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphabetic() {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let mut parameter = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || (c == '-' && parameter.is_empty()) {
                        parameter.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // A single space after a control word is part of the word.
                if chars.peek() == Some(&' ') {
                    chars.next();
                }

                if skip_depth.is_some() {
                    continue;
                }
                match word.as_str() {
                    "par" | "line" => text.push('\n'),
                    "tab" => text.push('\t'),
                    "page" => {
                        page_count += 1;
                        text.push('\u{c}');
                    }
                    "emdash" => text.push('\u{2014}'),
                    "endash" => text.push('\u{2013}'),
                    "lquote" => text.push('\u{2018}'),
                    "rquote" => text.push('\u{2019}'),
                    "ldblquote" => text.push('\u{201c}'),
                    "rdblquote" => text.push('\u{201d}'),
                    "u" => {
                        if let Ok(code) = parameter.parse::<i32>() {
                            let code = if code < 0 { code + 65_536 } else { code };
                            if let Some(ch) = char::from_u32(code as u32) {
                                text.push(ch);
                            }
                            // The following character is the legacy fallback.
                            unicode_skip = 1;
                        }
                    }
                    "fonttbl" | "colortbl" | "stylesheet" | "info" | "pict" | "object"
                    | "header" | "footer" => {
                        skip_depth.get_or_insert(depth);
                    }
                    _ => {}
                }
            }
            '\r' | '\n' => {}
            c => {
                if skip_depth.is_none() {
                    push_text(&mut text, c, &mut unicode_skip);
                }
            }
        }
    }

    Ok((text, page_count))
}

fn push_text(text: &mut String, c: char, unicode_skip: &mut u32) {
    if *unicode_skip > 0 {
        *unicode_skip -= 1;
        return;
    }
    text.push(c);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plain_paragraphs_are_extracted() {
        let rtf = br"{\rtf1\ansi\deff0 {\fonttbl {\f0 Times New Roman;}}
\f0\fs24 ORDER DENYING MOTION\par
The motion is denied.\par}";
        let (text, pages) = extract_rtf(rtf).unwrap();
        assert_eq!(text, "ORDER DENYING MOTION\nThe motion is denied.\n");
        assert_eq!(pages, 1);
    }

    #[test]
    fn page_breaks_and_escapes_are_honored() {
        let rtf = br"{\rtf1 first\page second \'e9 \u233e}";
        let (text, pages) = extract_rtf(rtf).unwrap();
        assert_eq!(pages, 2);
        assert!(text.contains("first"));
        assert!(text.contains("second"));
        // Both the \'e9 byte escape and the \u233 escape decode to e-acute,
        // and the fallback 'e' after \u233 is swallowed.
        assert_eq!(text.matches('\u{e9}').count(), 2);
        assert!(!text.contains("233"));
    }

    #[test]
    fn ignorable_destinations_are_skipped() {
        let rtf = br"{\rtf1 visible {\*\generator Riched20;}also visible}";
        let (text, _) = extract_rtf(rtf).unwrap();
        assert_eq!(text, "visible also visible");
    }

    #[test]
    fn missing_header_is_corrupted() {
        assert!(matches!(
            extract_rtf(b"just some text"),
            Err(ExtractError::Corrupted(_))
        ));
    }
}
