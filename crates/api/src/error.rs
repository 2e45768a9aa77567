use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use models::{ApiResponse, ErrorCode};

/// The error every handler funnels into. Rendering follows the wire
/// envelope; 5xx bodies carry an opaque error id instead of internals.
#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub field: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message).with_field(field)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(ErrorCode::DocumentNotFound, what)
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::InternalServerError, err.to_string())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut body = if status.is_server_error() {
            // Internals are logged under an opaque id, never surfaced.
            let error_id = uuid::Uuid::new_v4();
            tracing::error!(error_id = %error_id, code = %self.code, detail = %self.message, "request failed");
            let mut response =
                ApiResponse::<serde_json::Value>::err(self.code, "internal error");
            if let Some(error) = response.error.as_mut() {
                error.details = Some(serde_json::json!({ "error_id": error_id.to_string() }));
            }
            response
        } else {
            let mut response = ApiResponse::<serde_json::Value>::err(self.code, self.message);
            if let (Some(error), Some(field)) = (response.error.as_mut(), self.field) {
                error.field = Some(field);
            }
            response
        };

        if self.code == ErrorCode::RateLimitExceeded
            || self.code == ErrorCode::UploadRateLimitExceeded
        {
            if let Some(error) = body.error.as_mut() {
                error.details = Some(serde_json::json!({ "retry_after_seconds": 5 }));
            }
            let mut response = (status, axum::Json(body)).into_response();
            response
                .headers_mut()
                .insert("Retry-After", axum::http::HeaderValue::from_static("5"));
            return response;
        }

        (status, axum::Json(body)).into_response()
    }
}

impl From<pipeline::AdmitError> for ApiError {
    fn from(err: pipeline::AdmitError) -> Self {
        match err {
            pipeline::AdmitError::QueueFull => {
                Self::new(ErrorCode::RateLimitExceeded, "processing queue is full")
            }
            pipeline::AdmitError::ShuttingDown => {
                Self::new(ErrorCode::ServiceUnavailable, "service is shutting down")
            }
            pipeline::AdmitError::Invalid(message) => Self::new(ErrorCode::Validation, message),
        }
    }
}

impl From<search::IndexError> for ApiError {
    fn from(err: search::IndexError) -> Self {
        match &err {
            search::IndexError::NotFound(id) => {
                Self::new(ErrorCode::DocumentNotFound, format!("document {id}"))
            }
            search::IndexError::InvalidQuery(_) => {
                Self::new(ErrorCode::InvalidSearchQuery, err.to_string())
            }
            search::IndexError::MappingConflict(_) => {
                Self::new(ErrorCode::ResourceConflict, err.to_string())
            }
            _ => Self::new(ErrorCode::SearchError, err.to_string()),
        }
    }
}

impl From<storage::StorageError> for ApiError {
    fn from(err: storage::StorageError) -> Self {
        match &err {
            storage::StorageError::NotFound(key) => {
                Self::new(ErrorCode::NotFound, format!("object {key}"))
            }
            storage::StorageError::InvalidKey(_) | storage::StorageError::InvalidTtl(_) => {
                Self::new(ErrorCode::Validation, err.to_string())
            }
            _ => Self::new(ErrorCode::StorageError, err.to_string()),
        }
    }
}

impl From<extract::ExtractError> for ApiError {
    fn from(err: extract::ExtractError) -> Self {
        match &err {
            extract::ExtractError::Unsupported(_) | extract::ExtractError::CannotInferFormat => {
                Self::new(ErrorCode::UnsupportedFileType, err.to_string())
            }
            extract::ExtractError::Corrupted(_) => {
                Self::new(ErrorCode::CorruptedFile, err.to_string())
            }
            extract::ExtractError::MissingTool(_) => {
                Self::new(ErrorCode::ConfigurationError, err.to_string())
            }
            extract::ExtractError::Io(_) => {
                Self::new(ErrorCode::TextExtractionFailed, err.to_string())
            }
        }
    }
}
