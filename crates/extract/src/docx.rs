//! DOCX extraction: the document is a zip archive whose body text lives in
//! `word/document.xml`. Only runs of `w:t` text are kept; paragraphs become
//! newlines, tabs and breaks their whitespace equivalents.

use super::ExtractError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Read;

pub fn extract_docx(content: &[u8]) -> Result<(String, u32), ExtractError> {
    let cursor = std::io::Cursor::new(content);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|err| ExtractError::Corrupted(format!("not a zip archive: {err}")))?;

    let mut document_xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Corrupted("archive has no word/document.xml".to_string()))?
        .read_to_string(&mut document_xml)
        .map_err(|err| ExtractError::Corrupted(format!("unreadable document.xml: {err}")))?;

    parse_document_xml(&document_xml)
}

fn parse_document_xml(xml: &str) -> Result<(String, u32), ExtractError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut text = String::new();
    let mut page_count: u32 = 1;
    let mut in_text_run = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_text_run = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" => {
                    if is_page_break(&e) {
                        page_count += 1;
                        text.push('\u{c}');
                    } else {
                        text.push('\n');
                    }
                }
                b"w:lastRenderedPageBreak" => page_count += 1,
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let fragment = t
                    .unescape()
                    .map_err(|err| ExtractError::Corrupted(format!("bad xml text: {err}")))?;
                text.push_str(&fragment);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                return Err(ExtractError::Corrupted(format!(
                    "malformed document.xml: {err}"
                )))
            }
        }
    }

    Ok((text, page_count))
}

fn is_page_break(e: &quick_xml::events::BytesStart) -> bool {
    e.attributes().flatten().any(|attr| {
        attr.key.as_ref() == b"w:type" && attr.value.as_ref() == b"page"
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn docx_with_body(body_xml: &str) -> Vec<u8> {
        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:body>{body_xml}</w:body>
</w:document>"#
        );

        let mut archive = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::default();
        archive.start_file("word/document.xml", options).unwrap();
        archive.write_all(document.as_bytes()).unwrap();
        archive.finish().unwrap().into_inner()
    }

    #[test]
    fn paragraphs_and_runs_become_lines() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>Motion to Suppress</w:t></w:r></w:p>\
             <w:p><w:r><w:t>The defendant moves</w:t></w:r>\
             <w:r><w:t xml:space=\"preserve\"> to suppress evidence.</w:t></w:r></w:p>",
        );
        let (text, pages) = extract_docx(&bytes).unwrap();
        assert_eq!(text, "Motion to Suppress\nThe defendant moves to suppress evidence.\n");
        assert_eq!(pages, 1);
    }

    #[test]
    fn explicit_page_breaks_are_counted() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>page one</w:t><w:br w:type=\"page\"/><w:t>page two</w:t></w:r></w:p>",
        );
        let (text, pages) = extract_docx(&bytes).unwrap();
        assert_eq!(pages, 2);
        assert!(text.contains('\u{c}'));
    }

    #[test]
    fn line_breaks_are_not_page_breaks() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>line one</w:t><w:br/><w:t>line two</w:t></w:r></w:p>",
        );
        let (_, pages) = extract_docx(&bytes).unwrap();
        assert_eq!(pages, 1);
    }

    #[test]
    fn non_zip_input_is_corrupted() {
        assert!(matches!(
            extract_docx(b"plain text, not a docx"),
            Err(ExtractError::Corrupted(_))
        ));
    }

    #[test]
    fn zip_without_document_xml_is_corrupted() {
        let mut archive = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::default();
        archive.start_file("unrelated.txt", options).unwrap();
        archive.write_all(b"hello").unwrap();
        let bytes = archive.finish().unwrap().into_inner();

        assert!(matches!(
            extract_docx(&bytes),
            Err(ExtractError::Corrupted(_))
        ));
    }
}
