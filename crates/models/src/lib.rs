mod dates;
mod document;
mod envelope;
mod errors;
mod id;
mod jobs;
mod metadata;
mod search;

pub use dates::{DateRange, InvalidDateRange};
pub use document::{Document, DocumentType};
pub use envelope::{ApiResponse, ErrorBody};
pub use errors::ErrorCode;
pub use id::Id;
pub use jobs::{
    ClassifyHints, ClassifyJob, DownloadJob, ExtractJob, IndexJob, IngestSource, Priority,
    QueueKind,
};
pub use metadata::{
    Attorney, Authority, Case, Charge, Court, DocumentMetadata, Judge, MetadataError, Party,
};
pub use search::{SearchFilters, SearchHit, SearchRequest, SearchResponse, SortOrder};
