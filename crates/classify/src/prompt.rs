//! Prompt construction and response decoding shared by the LLM providers.
//! Providers ask for strict JSON; the decoder tolerates fences and leading
//! prose anyway.

use super::ProviderError;
use chrono::{DateTime, NaiveDate, Utc};
use models::{Attorney, Authority, Case, Charge, ClassifyHints, Court, DocumentMetadata, Judge, Party};
use serde::Deserialize;

/// The coarse categories the classifier may assign. Also the storage key
/// prefixes.
pub const SUPPORTED_CATEGORIES: &[&str] = &[
    "criminal",
    "civil",
    "family",
    "probate",
    "appellate",
    "administrative",
    "uncategorized",
];

/// Text beyond this many characters adds cost without improving the
/// classification.
const MAX_PROMPT_TEXT: usize = 12_000;

pub fn classification_prompt(text: &str, hints: &ClassifyHints) -> String {
    let mut excerpt = text;
    if let Some((cut, _)) = excerpt.char_indices().nth(MAX_PROMPT_TEXT) {
        excerpt = &excerpt[..cut];
    }

    let mut prompt = String::with_capacity(excerpt.len() + 1_024);
    prompt.push_str(
        "You classify legal documents. Analyze the document text and respond \
         with ONLY a JSON object (no prose, no code fences) of the form:\n\
         {\n\
           \"document_type\": one of [\"motion-family\",\"order\",\"ruling\",\"judgment\",\
\"brief\",\"complaint\",\"answer\",\"notice\",\"other\"],\n\
           \"legal_category\": one of [\"criminal\",\"civil\",\"family\",\"probate\",\
\"appellate\",\"administrative\",\"uncategorized\"],\n\
           \"subject\": string,\n\
           \"summary\": string (2-3 sentences),\n\
           \"case_name\": string or null,\n\
           \"case_number\": string or null,\n\
           \"court\": string or null,\n\
           \"judge\": string or null,\n\
           \"filing_date\": \"YYYY-MM-DD\" or null,\n\
           \"parties\": [{\"name\": string, \"role\": string or null}],\n\
           \"attorneys\": [{\"name\": string, \"role\": string or null, \
\"bar_number\": string or null, \"organization\": string or null}],\n\
           \"charges\": [{\"statute\": string or null, \"description\": string or null, \
\"grade\": string or null, \"count\": integer or null}],\n\
           \"authorities\": [{\"citation\": string, \"case_title\": string or null}],\n\
           \"legal_tags\": [string],\n\
           \"confidence\": number between 0 and 1\n\
         }\n",
    );

    if let Some(category) = &hints.category {
        prompt.push_str(&format!("\nThe uploader declared category: {category}\n"));
    }
    if let Some(description) = &hints.description {
        prompt.push_str(&format!("Uploader description: {description}\n"));
    }
    if let Some(case_number) = &hints.case_number {
        prompt.push_str(&format!("Known case number: {case_number}\n"));
    }

    prompt.push_str("\nDocument text:\n---\n");
    prompt.push_str(excerpt);
    prompt.push_str("\n---\n");
    prompt
}

/// The JSON shape providers are asked to produce.
#[derive(Debug, Default, Deserialize)]
pub struct LlmClassification {
    #[serde(default)]
    pub document_type: String,
    #[serde(default)]
    pub legal_category: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub case_name: Option<String>,
    #[serde(default)]
    pub case_number: Option<String>,
    #[serde(default)]
    pub court: Option<String>,
    #[serde(default)]
    pub judge: Option<String>,
    #[serde(default)]
    pub filing_date: Option<String>,
    #[serde(default)]
    pub parties: Vec<LlmParty>,
    #[serde(default)]
    pub attorneys: Vec<LlmAttorney>,
    #[serde(default)]
    pub charges: Vec<LlmCharge>,
    #[serde(default)]
    pub authorities: Vec<LlmAuthority>,
    #[serde(default)]
    pub legal_tags: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Deserialize)]
pub struct LlmParty {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LlmAttorney {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub bar_number: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LlmCharge {
    #[serde(default)]
    pub statute: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LlmAuthority {
    pub citation: String,
    #[serde(default)]
    pub case_title: Option<String>,
}

/// Pull the JSON object out of a model response, tolerating code fences and
/// leading prose.
pub fn parse_llm_json(content: &str) -> Result<LlmClassification, ProviderError> {
    let trimmed = content.trim();
    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(open), Some(close)) if close > open => &trimmed[open..=close],
        _ => {
            return Err(ProviderError::MalformedResponse(
                "no JSON object in response".to_string(),
            ))
        }
    };
    serde_json::from_str(candidate)
        .map_err(|err| ProviderError::MalformedResponse(err.to_string()))
}

/// Fold an LLM response and the caller's hints into document metadata.
/// Hints win over model output wherever both are present.
pub fn into_metadata(
    llm: LlmClassification,
    document_name: &str,
    hints: &ClassifyHints,
) -> DocumentMetadata {
    let document_type = llm
        .document_type
        .parse()
        .unwrap_or(models::DocumentType::Other);
    let category = if llm.legal_category.is_empty() {
        "uncategorized".to_string()
    } else {
        llm.legal_category.to_ascii_lowercase()
    };

    let mut metadata = DocumentMetadata {
        document_name: document_name.to_string(),
        subject: llm.subject.filter(|s| !s.is_empty()),
        summary: llm.summary.filter(|s| !s.is_empty()),
        document_type,
        category,
        filing_date: llm.filing_date.as_deref().and_then(parse_date),
        parties: llm
            .parties
            .into_iter()
            .map(|p| Party {
                name: p.name,
                role: p.role,
                party_type: None,
                date: None,
            })
            .collect(),
        attorneys: llm
            .attorneys
            .into_iter()
            .map(|a| Attorney {
                name: a.name,
                bar_number: a.bar_number,
                role: a.role,
                organization: a.organization,
            })
            .collect(),
        charges: llm
            .charges
            .into_iter()
            .map(|c| Charge {
                statute: c.statute,
                description: c.description,
                grade: c.grade,
                class: None,
                count: c.count,
            })
            .collect(),
        authorities: llm
            .authorities
            .into_iter()
            .map(|a| Authority {
                citation: a.citation,
                case_title: a.case_title,
                authority_type: None,
                precedent: None,
                page: None,
            })
            .collect(),
        legal_tags: llm.legal_tags.into_iter().collect(),
        confidence: llm.confidence.clamp(0.0, 1.0),
        ..Default::default()
    };

    if llm.case_name.is_some() || llm.case_number.is_some() {
        metadata.case = Some(Case {
            name: llm.case_name.filter(|s| !s.is_empty()),
            number: llm.case_number.filter(|s| !s.is_empty()),
            ..Default::default()
        });
    }
    if let Some(court) = llm.court.filter(|s| !s.is_empty()) {
        metadata.court = Some(Court {
            name: Some(court),
            ..Default::default()
        });
    }
    if let Some(judge) = llm.judge.filter(|s| !s.is_empty()) {
        metadata.judge = Some(Judge {
            name: Some(judge),
            ..Default::default()
        });
    }

    apply_hints(&mut metadata, hints);
    metadata
}

/// Overlay caller-declared hints onto metadata; declared values are
/// authoritative over inferred ones.
pub fn apply_hints(metadata: &mut DocumentMetadata, hints: &ClassifyHints) {
    if let Some(category) = &hints.category {
        if !category.is_empty() {
            metadata.category = category.to_ascii_lowercase();
        }
    }
    if hints.case_name.is_some() || hints.case_number.is_some() {
        let case = metadata.case.get_or_insert_with(Case::default);
        if let Some(name) = &hints.case_name {
            case.name = Some(name.clone());
        }
        if let Some(number) = &hints.case_number {
            case.number = Some(number.clone());
        }
    }
    if let Some(court) = &hints.court {
        metadata.court.get_or_insert_with(Court::default).name = Some(court.clone());
    }
    if let Some(judge) = &hints.judge {
        metadata.judge.get_or_insert_with(Judge::default).name = Some(judge.clone());
    }
    if let Some(author) = &hints.author {
        metadata.author = Some(author.clone());
    }
    if metadata.subject.is_none() {
        metadata.subject = hints.description.clone();
    }
    for tag in &hints.legal_tags {
        if !tag.is_empty() {
            metadata.legal_tags.insert(tag.clone());
        }
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Some(datetime.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn json_is_recovered_from_fenced_responses() {
        let content = "Here is the classification:\n```json\n{\"document_type\":\"order\",\
                       \"legal_category\":\"criminal\",\"confidence\":0.92}\n```";
        let llm = parse_llm_json(content).unwrap();
        assert_eq!(llm.document_type, "order");
        assert!((llm.confidence - 0.92).abs() < 1e-9);
    }

    #[test]
    fn responses_without_json_are_malformed() {
        assert!(matches!(
            parse_llm_json("I could not classify this document."),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn metadata_is_assembled_with_hints_winning() {
        let llm = LlmClassification {
            document_type: "motion-family".to_string(),
            legal_category: "Criminal".to_string(),
            subject: Some("Motion to suppress".to_string()),
            case_number: Some("WRONG-1".to_string()),
            judge: Some("Hon. A. Park".to_string()),
            filing_date: Some("2024-03-09".to_string()),
            confidence: 0.87,
            ..Default::default()
        };
        let hints = ClassifyHints {
            case_number: Some("CR-2024-0042".to_string()),
            legal_tags: vec!["fourth-amendment".to_string()],
            ..Default::default()
        };

        let metadata = into_metadata(llm, "motion.pdf", &hints);
        assert_eq!(metadata.document_type, models::DocumentType::MotionFamily);
        assert_eq!(metadata.category, "criminal");
        assert_eq!(metadata.case_number(), Some("CR-2024-0042"));
        assert_eq!(
            metadata.judge.as_ref().and_then(|j| j.name.as_deref()),
            Some("Hon. A. Park")
        );
        assert_eq!(
            metadata.filing_date.map(|d| d.format("%Y-%m-%d").to_string()),
            Some("2024-03-09".to_string())
        );
        assert!(metadata.legal_tags.contains("fourth-amendment"));
    }

    #[test]
    fn unknown_document_types_fall_back_to_other() {
        let llm = LlmClassification {
            document_type: "subpoena".to_string(),
            legal_category: "criminal".to_string(),
            confidence: 0.8,
            ..Default::default()
        };
        let metadata = into_metadata(llm, "doc.pdf", &ClassifyHints::default());
        assert_eq!(metadata.document_type, models::DocumentType::Other);
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let llm = LlmClassification {
            document_type: "order".to_string(),
            legal_category: "civil".to_string(),
            confidence: 3.4,
            ..Default::default()
        };
        let metadata = into_metadata(llm, "doc.pdf", &ClassifyHints::default());
        assert!((metadata.confidence - 1.0).abs() < 1e-9);
    }
}
