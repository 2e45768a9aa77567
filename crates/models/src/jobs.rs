use super::Document;
use serde::{Deserialize, Serialize};

/// Scheduling priority of queued work. Ordered: `Low < Normal < High <
/// Critical`; queues deliver higher priorities first.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// The four pipeline stages, used for queue naming and status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QueueKind {
    Download,
    Extract,
    Classify,
    Index,
}

/// Where the download stage acquires document bytes from.
#[derive(Debug, Clone)]
pub enum IngestSource {
    /// An upload buffer already held in memory.
    Buffer(bytes::Bytes),
    /// A remote URL to fetch.
    RemoteUrl(url::Url),
}

/// Caller-declared fields accompanying an upload. They seed classification
/// prompts and override extracted values where set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ClassifyHints {
    /// Original file name; carried so classification prompts and degraded
    /// results can name the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub court: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub legal_tags: Vec<String>,
}

// Stage payloads. Each stage consumes its own variant and emits the next
// one; the document rides along, accreting stage outputs.

#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub document: Document,
    pub source: IngestSource,
    pub hints: ClassifyHints,
}

#[derive(Debug, Clone)]
pub struct ExtractJob {
    pub document: Document,
    pub hints: ClassifyHints,
}

#[derive(Debug, Clone)]
pub struct ClassifyJob {
    pub document: Document,
    pub hints: ClassifyHints,
    pub page_count: Option<u32>,
    pub word_count: Option<u64>,
    pub language: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IndexJob {
    pub document: Document,
    /// True when classification exhausted every provider and the document
    /// carries the low-confidence default instead of a real result.
    pub degraded: bool,
}
