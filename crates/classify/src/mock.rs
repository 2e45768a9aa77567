use super::{prompt, Provider, ProviderError};
use models::{ClassifyHints, DocumentMetadata, DocumentType};

/// A deterministic keyword classifier, used in tests, local stacks, and as
/// the last link of a provider chain.
#[derive(Debug, Default)]
pub struct RuleBasedProvider;

const TYPE_RULES: &[(DocumentType, &[&str])] = &[
    (
        DocumentType::MotionFamily,
        &["motion to", "moves this court", "notice of motion", "motion for"],
    ),
    (
        DocumentType::Order,
        &["it is so ordered", "it is hereby ordered", "order granting", "order denying"],
    ),
    (DocumentType::Ruling, &["ruling on", "the court rules"]),
    (
        DocumentType::Judgment,
        &["judgment is entered", "final judgment", "judgment of conviction"],
    ),
    (
        DocumentType::Brief,
        &["brief in support", "opening brief", "reply brief", "amicus"],
    ),
    (
        DocumentType::Complaint,
        &["complaint for", "plaintiff alleges", "cause of action"],
    ),
    (
        DocumentType::Answer,
        &["answer to complaint", "affirmative defense", "admits and denies"],
    ),
    (
        DocumentType::Notice,
        &["notice of appeal", "notice of hearing", "notice is hereby given"],
    ),
];

const CRIMINAL_MARKERS: &[&str] = &[
    "defendant",
    "prosecution",
    "people v",
    "state v",
    "united states v",
    "indictment",
    "suppress",
];
const FAMILY_MARKERS: &[&str] = &["custody", "dissolution of marriage", "child support"];
const PROBATE_MARKERS: &[&str] = &["estate of", "probate", "testament"];

#[async_trait::async_trait]
impl Provider for RuleBasedProvider {
    fn name(&self) -> &'static str {
        "rules"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn classify(
        &self,
        text: &str,
        hints: &ClassifyHints,
    ) -> Result<DocumentMetadata, ProviderError> {
        let haystack = format!(
            "{} {}",
            hints.file_name.as_deref().unwrap_or_default(),
            text
        )
        .to_lowercase();

        let document_type = TYPE_RULES
            .iter()
            .find(|(_, needles)| needles.iter().any(|n| haystack.contains(n)))
            .map(|(doc_type, _)| *doc_type)
            .unwrap_or(DocumentType::Other);

        let category = if CRIMINAL_MARKERS.iter().any(|m| haystack.contains(m)) {
            "criminal"
        } else if FAMILY_MARKERS.iter().any(|m| haystack.contains(m)) {
            "family"
        } else if PROBATE_MARKERS.iter().any(|m| haystack.contains(m)) {
            "probate"
        } else if document_type == DocumentType::Other {
            "uncategorized"
        } else {
            "civil"
        };

        // Keyword hits are real signal but never high confidence.
        let confidence = if document_type == DocumentType::Other {
            0.3
        } else {
            0.6
        };

        let mut metadata = DocumentMetadata {
            document_name: hints
                .file_name
                .clone()
                .unwrap_or_else(|| "document".to_string()),
            subject: first_line(text),
            document_type,
            category: category.to_string(),
            confidence,
            ..Default::default()
        };
        prompt::apply_hints(&mut metadata, hints);
        Ok(metadata)
    }
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| line.len() > 8)
        .map(|line| {
            let mut line = line.to_string();
            if line.len() > 120 {
                let mut cut = 120;
                while !line.is_char_boundary(cut) {
                    cut -= 1;
                }
                line.truncate(cut);
            }
            line
        })
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn motions_are_recognized_as_criminal_motions() {
        let provider = RuleBasedProvider;
        let text = "NOTICE OF MOTION AND MOTION TO SUPPRESS EVIDENCE\n\
                    The defendant respectfully moves this Court to suppress all evidence.";
        let metadata = provider
            .classify(text, &ClassifyHints::default())
            .await
            .unwrap();

        assert_eq!(metadata.document_type, DocumentType::MotionFamily);
        assert_eq!(metadata.category, "criminal");
        assert!((metadata.confidence - 0.6).abs() < 1e-9);
        assert!(metadata.subject.is_some());
    }

    #[tokio::test]
    async fn unrecognized_text_is_other_and_uncategorized() {
        let provider = RuleBasedProvider;
        let metadata = provider
            .classify("grocery list: milk, eggs", &ClassifyHints::default())
            .await
            .unwrap();
        assert_eq!(metadata.document_type, DocumentType::Other);
        assert_eq!(metadata.category, "uncategorized");
        assert!(metadata.confidence < 0.5);
    }

    #[tokio::test]
    async fn classification_is_deterministic() {
        let provider = RuleBasedProvider;
        let text = "ORDER GRANTING MOTION TO DISMISS. It is so ordered.";
        let first = provider.classify(text, &ClassifyHints::default()).await.unwrap();
        let second = provider.classify(text, &ClassifyHints::default()).await.unwrap();
        assert_eq!(first.document_type, second.document_type);
        assert_eq!(first.category, second.category);
    }
}
