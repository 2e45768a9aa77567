use super::DocumentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Structured legal metadata produced by the classify stage, or supplied by a
/// caller through the update-metadata surface. Nested entities are the source
/// of truth; the legacy flat fields the old wire format carried are exposed as
/// read-time projections (`case_name()`, `case_number()`) and written only
/// into external wire forms such as the search index document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DocumentMetadata {
    pub document_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub document_type: DocumentType,
    /// Coarse legal category, also used as the storage key prefix.
    #[serde(default)]
    pub category: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case: Option<Case>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub court: Option<Court>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge: Option<Judge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parties: Vec<Party>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attorneys: Vec<Attorney>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charges: Vec<Charge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorities: Vec<Authority>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filing_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hearing_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub served_date: Option<DateTime<Utc>>,
    /// Set when classification completes, degraded or not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    /// Legacy catch-all timestamp retained for old index documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub legal_tags: BTreeSet<String>,
    /// Document author where one was declared on upload. There is no nested
    /// counterpart; parties and attorneys model the participants instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default)]
    pub ai_classified: bool,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
    #[error("ai-classified metadata must carry a concrete document type")]
    ClassifiedButUnknown,
    #[error("category must not be empty")]
    EmptyCategory,
}

impl DocumentMetadata {
    /// Read-time projection of the legacy `case_name` wire field.
    pub fn case_name(&self) -> Option<&str> {
        self.case.as_ref().and_then(|c| c.name.as_deref())
    }

    /// Read-time projection of the legacy `case_number` wire field.
    pub fn case_number(&self) -> Option<&str> {
        self.case.as_ref().and_then(|c| c.number.as_deref())
    }

    pub fn validate(&self) -> Result<(), MetadataError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(MetadataError::ConfidenceOutOfRange(self.confidence));
        }
        if self.ai_classified && self.document_type == DocumentType::Unknown {
            return Err(MetadataError::ClassifiedButUnknown);
        }
        if self.category.is_empty() {
            return Err(MetadataError::EmptyCategory);
        }
        Ok(())
    }

    /// The synthetic result used when extraction yields no text or every
    /// classification provider fails: the document still reaches the index
    /// rather than being dropped.
    pub fn low_confidence_default(document_name: &str) -> Self {
        Self {
            document_name: document_name.to_string(),
            document_type: DocumentType::Other,
            category: "uncategorized".to_string(),
            processed_at: Some(Utc::now()),
            ai_classified: false,
            confidence: 0.1,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Case {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nature_of_suit: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Court {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Judge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Party {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Attorney {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bar_number: Option<String>,
    /// defense, prosecution, counsel, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Charge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Authority {
    pub citation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precedent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn projections_read_through_to_nested_case() {
        let mut meta = DocumentMetadata::default();
        assert_eq!(meta.case_name(), None);

        meta.case = Some(Case {
            number: Some("2:24-cv-01337".to_string()),
            name: Some("Smith v. Jones".to_string()),
            ..Default::default()
        });
        assert_eq!(meta.case_name(), Some("Smith v. Jones"));
        assert_eq!(meta.case_number(), Some("2:24-cv-01337"));
    }

    #[test]
    fn validation_rejects_out_of_range_confidence() {
        let meta = DocumentMetadata {
            confidence: 1.2,
            category: "criminal".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            meta.validate(),
            Err(MetadataError::ConfidenceOutOfRange(_))
        ));
    }

    #[test]
    fn validation_rejects_classified_unknown() {
        let meta = DocumentMetadata {
            ai_classified: true,
            document_type: DocumentType::Unknown,
            confidence: 0.9,
            category: "criminal".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            meta.validate(),
            Err(MetadataError::ClassifiedButUnknown)
        ));
    }

    #[test]
    fn low_confidence_default_is_valid_and_degraded() {
        let meta = DocumentMetadata::low_confidence_default("scan.pdf");
        meta.validate().unwrap();
        assert_eq!(meta.document_type, DocumentType::Other);
        assert!(!meta.ai_classified);
        assert!(meta.confidence < 0.2);
        assert!(meta.processed_at.is_some());
    }
}
