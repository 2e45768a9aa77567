use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("file name is empty after sanitization")]
    Empty,
    #[error("path '{0}' contains a traversal component")]
    Traversal(String),
}

/// Build the canonical object key for a document:
/// `documents/<category-or-"uncategorized">/<YYYY-MM-DD>/<sanitized_name>`.
pub fn object_key(
    category: Option<&str>,
    file_name: &str,
    when: DateTime<Utc>,
) -> Result<String, KeyError> {
    let category = match category.map(str::trim).filter(|c| !c.is_empty()) {
        Some(c) => sanitize_component(c)?,
        None => "uncategorized".to_string(),
    };
    let file_name = sanitize_file_name(file_name)?;
    Ok(format!(
        "documents/{}/{}/{}",
        category,
        when.format("%Y-%m-%d"),
        file_name
    ))
}

/// Replace unicode whitespace with `_` and reject traversal. The result is a
/// single path component.
pub fn sanitize_file_name(name: &str) -> Result<String, KeyError> {
    let trimmed = name.trim().trim_start_matches('/');
    if trimmed.split('/').any(|part| part == "..") {
        return Err(KeyError::Traversal(name.to_string()));
    }
    // Collapse any directory structure a client smuggled into the name.
    let base = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let sanitized: String = base
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    if sanitized.is_empty() || sanitized == "." {
        return Err(KeyError::Empty);
    }
    Ok(sanitized)
}

fn sanitize_component(component: &str) -> Result<String, KeyError> {
    if component.contains("..") {
        return Err(KeyError::Traversal(component.to_string()));
    }
    Ok(component
        .chars()
        .map(|c| match c {
            '/' => '-',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect())
}

/// Normalize a caller-supplied object path: strip leading slashes, reject
/// traversal. Interior slashes are preserved so prefixes keep working.
pub fn normalize_path(path: &str) -> Result<String, KeyError> {
    let trimmed = path.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(KeyError::Empty);
    }
    if trimmed.split('/').any(|part| part == "..") {
        return Err(KeyError::Traversal(path.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Content type inferred from the file extension, with a fixed mapping.
pub fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        "rtf" => "application/rtf",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "json" => "application/json",
        "xml" => "application/xml",
        "csv" => "text/csv",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn object_keys_are_dated_and_categorized() {
        let when = Utc.with_ymd_and_hms(2024, 3, 9, 15, 30, 0).unwrap();
        assert_eq!(
            object_key(Some("criminal"), "motion to dismiss.pdf", when).unwrap(),
            "documents/criminal/2024-03-09/motion_to_dismiss.pdf"
        );
        assert_eq!(
            object_key(None, "order.pdf", when).unwrap(),
            "documents/uncategorized/2024-03-09/order.pdf"
        );
        assert_eq!(
            object_key(Some(""), "order.pdf", when).unwrap(),
            "documents/uncategorized/2024-03-09/order.pdf"
        );
    }

    #[test]
    fn unicode_whitespace_becomes_underscores() {
        // U+00A0 no-break space and U+2003 em space both count.
        assert_eq!(
            sanitize_file_name("brief\u{00a0}in\u{2003}support.pdf").unwrap(),
            "brief_in_support.pdf"
        );
    }

    #[test]
    fn traversal_is_rejected() {
        assert!(matches!(
            sanitize_file_name("../../etc/passwd"),
            Err(KeyError::Traversal(_))
        ));
        assert!(matches!(
            normalize_path("documents/../secrets"),
            Err(KeyError::Traversal(_))
        ));
        assert_eq!(
            normalize_path("/documents/criminal/a.pdf").unwrap(),
            "documents/criminal/a.pdf"
        );
    }

    #[test]
    fn smuggled_directories_are_collapsed() {
        assert_eq!(
            sanitize_file_name("/uploads/2024/motion.pdf").unwrap(),
            "motion.pdf"
        );
    }

    #[test]
    fn content_types_follow_the_fixed_mapping() {
        assert_eq!(content_type_for("a.pdf"), "application/pdf");
        assert_eq!(
            content_type_for("a.DOCX"),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(content_type_for("a.txt"), "text/plain");
        assert_eq!(content_type_for("mystery"), "application/octet-stream");
    }
}
