use serde::{Deserialize, Serialize};

/// The error taxonomy surfaced on the wire envelope. Every code carries a
/// canonical kebab-case string form and maps to exactly one HTTP status.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorCode {
    Authentication,
    Authorization,
    Validation,
    MissingRequiredField,
    InvalidFieldType,
    InvalidFieldValue,
    InvalidFieldFormat,
    FileTooLarge,
    FileTooSmall,
    UnsupportedFileType,
    CorruptedFile,
    ProcessingError,
    TextExtractionFailed,
    ClassificationFailed,
    IndexingFailed,
    StorageError,
    SearchError,
    InvalidSearchQuery,
    SearchTimeout,
    NotFound,
    DocumentNotFound,
    ResourceConflict,
    RateLimitExceeded,
    UploadRateLimitExceeded,
    InternalServerError,
    ServiceUnavailable,
    DatabaseError,
    ExternalApiError,
    ConfigurationError,
    FeatureDisabled,
}

impl ErrorCode {
    /// The HTTP status this code surfaces as.
    pub fn http_status(&self) -> u16 {
        use ErrorCode::*;
        match self {
            Authentication => 401,
            Authorization => 403,
            Validation | MissingRequiredField | InvalidFieldType | InvalidFieldValue
            | InvalidFieldFormat => 400,
            FileTooLarge => 413,
            FileTooSmall | CorruptedFile | InvalidSearchQuery => 422,
            UnsupportedFileType => 415,
            NotFound | DocumentNotFound => 404,
            ResourceConflict => 409,
            RateLimitExceeded | UploadRateLimitExceeded => 429,
            SearchTimeout | ExternalApiError => 502,
            ServiceUnavailable | FeatureDisabled => 503,
            ProcessingError | TextExtractionFailed | ClassificationFailed | IndexingFailed
            | StorageError | SearchError | InternalServerError | DatabaseError
            | ConfigurationError => 500,
        }
    }

    /// Whether failing work carrying this code should be retried in place.
    pub fn is_transient(&self) -> bool {
        use ErrorCode::*;
        matches!(
            self,
            RateLimitExceeded
                | UploadRateLimitExceeded
                | SearchTimeout
                | ServiceUnavailable
                | ExternalApiError
                | StorageError
                | IndexingFailed
        )
    }
}
