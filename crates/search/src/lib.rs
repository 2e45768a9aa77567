#![recursion_limit = "256"]

mod client;
mod index_doc;
mod query;
mod schema;

pub use client::{DocumentStats, IndexClient, IndexConfig};
pub use index_doc::{document_from_source, to_index_document};
pub use query::QueryBuilder;
pub use schema::{index_definition, LEGAL_SYNONYMS};

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("index returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("mapping conflict: {0}")]
    MappingConflict(String),
    #[error("document '{0}' was not found")]
    NotFound(String),
    #[error("search response was malformed: {0}")]
    MalformedResponse(String),
    #[error(transparent)]
    InvalidQuery(#[from] models::InvalidDateRange),
}

impl IndexError {
    /// Mapping conflicts and bad queries are terminal; everything else gets
    /// retried with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            IndexError::Request(_) => true,
            IndexError::Status { status, .. } => *status == 429 || *status >= 500,
            IndexError::MappingConflict(_)
            | IndexError::NotFound(_)
            | IndexError::MalformedResponse(_)
            | IndexError::InvalidQuery(_) => false,
        }
    }
}
