use super::{DocumentMetadata, Id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Document is the unit of work flowing through the pipeline. It's born on
/// ingest, mutates only by appending stage outputs, and is frozen once its
/// index commit succeeds.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Document {
    pub id: Id,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Extracted text, present after the extract stage. Omitted from API
    /// responses of document listings to bound payload sizes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, size: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Id::new(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            size,
            content_hash: None,
            text: None,
            metadata: None,
            storage_key: None,
            public_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// The closed set of legal document classifications.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DocumentType {
    MotionFamily,
    Order,
    Ruling,
    Judgment,
    Brief,
    Complaint,
    Answer,
    Notice,
    Other,
    Unknown,
}

impl DocumentType {
    /// Every classifiable type, in display order. `Unknown` is excluded: it
    /// marks documents that were never classified, and is not a valid target.
    pub fn all() -> &'static [DocumentType] {
        &[
            DocumentType::MotionFamily,
            DocumentType::Order,
            DocumentType::Ruling,
            DocumentType::Judgment,
            DocumentType::Brief,
            DocumentType::Complaint,
            DocumentType::Answer,
            DocumentType::Notice,
            DocumentType::Other,
        ]
    }
}

impl Default for DocumentType {
    fn default() -> Self {
        DocumentType::Unknown
    }
}

#[cfg(test)]
mod test {
    use super::DocumentType;

    #[test]
    fn document_type_wire_form_is_kebab_case() {
        assert_eq!(
            serde_json::to_string(&DocumentType::MotionFamily).unwrap(),
            "\"motion-family\""
        );
        assert_eq!(DocumentType::MotionFamily.to_string(), "motion-family");
        assert_eq!(
            "motion-family".parse::<DocumentType>().unwrap(),
            DocumentType::MotionFamily
        );
    }

    #[test]
    fn all_excludes_unknown() {
        assert!(!DocumentType::all().contains(&DocumentType::Unknown));
    }
}
