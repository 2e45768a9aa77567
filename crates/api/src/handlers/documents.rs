use super::{ok, ApiResult};
use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::App;
use axum::extract::{Multipart, Path, State};
use models::{ClassifyHints, Document, ErrorCode, Id, IngestSource, Priority};
use pipeline::{Outcome, SubmitRequest};
use std::sync::Arc;

pub(crate) struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: bytes::Bytes,
}

/// Pull the `file` part and the optional hint fields out of a multipart
/// upload.
pub(crate) async fn parse_upload(
    multipart: &mut Multipart,
) -> Result<(Vec<UploadedFile>, ClassifyHints), ApiError> {
    let mut files = Vec::new();
    let mut hints = ClassifyHints::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::new(ErrorCode::Validation, err.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" | "files" | "files[]" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::new(ErrorCode::Validation, err.to_string()))?;
                files.push(UploadedFile {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            "category" => hints.category = Some(text_field(field).await?),
            "description" => hints.description = Some(text_field(field).await?),
            "case_name" => hints.case_name = Some(text_field(field).await?),
            "case_number" => hints.case_number = Some(text_field(field).await?),
            "author" => hints.author = Some(text_field(field).await?),
            "judge" => hints.judge = Some(text_field(field).await?),
            "court" => hints.court = Some(text_field(field).await?),
            "legal_tags" | "legal_tags[]" => hints.legal_tags.push(text_field(field).await?),
            other => {
                tracing::debug!(field = other, "ignoring unknown multipart field");
            }
        }
    }

    Ok((files, hints))
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|err| ApiError::new(ErrorCode::Validation, err.to_string()))
}

/// `POST /api/v1/categorise`: run the full pipeline synchronously for one
/// uploaded file and return the assembled document.
pub async fn categorise(
    State(app): State<Arc<App>>,
    mut multipart: Multipart,
) -> ApiResult<Document> {
    let (mut files, hints) = parse_upload(&mut multipart).await?;
    if files.len() != 1 {
        return Err(
            ApiError::new(ErrorCode::MissingRequiredField, "exactly one file is required")
                .with_field("file"),
        );
    }
    let file = files.remove(0);

    let outcome = app
        .pipeline
        .process_sync(SubmitRequest {
            file_name: file.file_name,
            content_type: file.content_type,
            source: IngestSource::Buffer(file.bytes),
            hints,
            priority: Priority::High,
        })
        .await?;

    match outcome {
        Outcome::Succeeded { document, .. } => ok(*document),
        Outcome::Failed { error } => Err(ApiError::new(ErrorCode::ProcessingError, error)),
        Outcome::Cancelled => Err(ApiError::new(
            ErrorCode::ServiceUnavailable,
            "processing was cancelled",
        )),
    }
}

pub async fn get_document(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> ApiResult<Document> {
    let id = parse_id(&id)?;
    let document = app.pipeline.index().get_document(id).await?;
    ok(document)
}

pub async fn delete_document(
    State(app): State<Arc<App>>,
    _auth: Authenticated,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    let id = parse_id(&id)?;
    let document = app.pipeline.index().get_document(id).await?;

    app.pipeline.index().delete_document(id).await?;
    if let Some(storage_key) = &document.storage_key {
        // The index entry is gone; a failed binary delete only strands the
        // blob, so log and move on.
        if let Err(err) = app.pipeline.storage().delete(storage_key).await {
            tracing::warn!(document = %id, error = %err, "failed to delete stored binary");
        }
    }
    ok(serde_json::json!({ "deleted": id.to_string() }))
}

/// `GET /api/v1/documents/{id}/file`: 302 to the CDN-resolved URL.
pub async fn serve_file(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let document = app.pipeline.index().get_document(id).await?;
    let storage_key = document
        .storage_key
        .as_deref()
        .ok_or_else(|| ApiError::not_found(format!("document {id} has no stored binary")))?;

    let url = app.pipeline.storage().resolve_public_url(storage_key);
    let location = axum::http::HeaderValue::from_str(&url)
        .map_err(|_| ApiError::internal("stored URL is not a valid header value"))?;
    Ok((
        axum::http::StatusCode::FOUND,
        [(axum::http::header::LOCATION, location)],
    ))
}

#[derive(Debug, serde::Deserialize)]
pub struct UpdateMetadataRequest {
    pub document_id: String,
    pub metadata: models::DocumentMetadata,
}

/// `POST /api/v1/update-metadata`: replace a document's metadata and
/// reindex it. Requires auth.
pub async fn update_metadata(
    State(app): State<Arc<App>>,
    _auth: Authenticated,
    axum::Json(request): axum::Json<UpdateMetadataRequest>,
) -> ApiResult<Document> {
    let id = parse_id(&request.document_id)?;
    request
        .metadata
        .validate()
        .map_err(|err| ApiError::validation(err.to_string(), "metadata"))?;

    let mut document = app.pipeline.index().get_document(id).await?;
    document.metadata = Some(request.metadata);
    document.touch();
    app.pipeline.index().index_document(&document).await?;
    ok(document)
}

pub(crate) fn parse_id(raw: &str) -> Result<Id, ApiError> {
    raw.parse().map_err(|_| {
        ApiError::new(
            ErrorCode::InvalidFieldFormat,
            format!("'{raw}' is not a valid document id"),
        )
        .with_field("document_id")
    })
}
