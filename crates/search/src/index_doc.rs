//! Mapping between the domain [`Document`] and its index form. The nested
//! entities are the source of truth; the flat `case_name`/`case_number`/
//! `court_name`/`judge_name` fields are projections injected only here, on
//! the external wire, for filtering and sorting.

use models::Document;
use serde_json::Value;

pub fn to_index_document(document: &Document) -> Result<Value, super::IndexError> {
    let mut value = serde_json::to_value(document)
        .map_err(|err| super::IndexError::MalformedResponse(err.to_string()))?;

    if let Some(metadata) = &document.metadata {
        let target = &mut value["metadata"];
        if let Some(case_name) = metadata.case_name() {
            target["case_name"] = Value::String(case_name.to_string());
        }
        if let Some(case_number) = metadata.case_number() {
            target["case_number"] = Value::String(case_number.to_string());
        }
        if let Some(court_name) = metadata.court.as_ref().and_then(|c| c.name.as_deref()) {
            target["court_name"] = Value::String(court_name.to_string());
        }
        if let Some(judge_name) = metadata.judge.as_ref().and_then(|j| j.name.as_deref()) {
            target["judge_name"] = Value::String(judge_name.to_string());
        }
    }
    Ok(value)
}

/// Rehydrate a Document from a search hit's `_source`. The injected
/// projection fields are ignored by deserialization.
pub fn document_from_source(source: Value) -> Result<Document, super::IndexError> {
    serde_json::from_value(source)
        .map_err(|err| super::IndexError::MalformedResponse(err.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;
    use models::{Case, Court, DocumentMetadata, DocumentType, Judge};

    fn sample_document() -> Document {
        let mut document = Document::new("motion.pdf", "application/pdf", 1_234);
        document.text = Some("The defendant moves to suppress.".to_string());
        document.metadata = Some(DocumentMetadata {
            document_name: "motion.pdf".to_string(),
            document_type: DocumentType::MotionFamily,
            category: "criminal".to_string(),
            case: Some(Case {
                name: Some("People v. Crane".to_string()),
                number: Some("CR-2024-0042".to_string()),
                ..Default::default()
            }),
            court: Some(Court {
                name: Some("Superior Court".to_string()),
                ..Default::default()
            }),
            judge: Some(Judge {
                name: Some("Hon. A. Park".to_string()),
                ..Default::default()
            }),
            confidence: 0.9,
            ai_classified: true,
            processed_at: Some(chrono::Utc::now()),
            ..Default::default()
        });
        document
    }

    #[test]
    fn projections_are_injected_on_the_wire() {
        let document = sample_document();
        let value = to_index_document(&document).unwrap();

        assert_eq!(value["metadata"]["case_name"], "People v. Crane");
        assert_eq!(value["metadata"]["case_number"], "CR-2024-0042");
        assert_eq!(value["metadata"]["court_name"], "Superior Court");
        assert_eq!(value["metadata"]["judge_name"], "Hon. A. Park");
        // The nested form remains the source of truth.
        assert_eq!(value["metadata"]["case"]["name"], "People v. Crane");
    }

    #[test]
    fn index_documents_round_trip_back_to_documents() {
        let document = sample_document();
        let value = to_index_document(&document).unwrap();
        let restored = document_from_source(value).unwrap();

        assert_eq!(restored.id, document.id);
        assert_eq!(
            restored.metadata.as_ref().unwrap().case_number(),
            Some("CR-2024-0042")
        );
    }
}
