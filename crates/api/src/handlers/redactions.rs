use super::documents::{parse_id, parse_upload};
use super::{ok, ApiResult};
use crate::error::ApiError;
use crate::App;
use axum::extract::{Multipart, Path, State};
use extract::RedactionReport;
use models::ErrorCode;
use std::sync::Arc;

/// `POST /api/v1/analyze-redactions`: extract the uploaded file's text and
/// report redaction artifacts. A sibling of the pipeline, never a stage.
pub async fn analyze(
    State(app): State<Arc<App>>,
    mut multipart: Multipart,
) -> ApiResult<RedactionReport> {
    let (mut files, _hints) = parse_upload(&mut multipart).await?;
    if files.len() != 1 {
        return Err(
            ApiError::new(ErrorCode::MissingRequiredField, "exactly one file is required")
                .with_field("file"),
        );
    }
    let file = files.remove(0);

    let extraction = app
        .extractor
        .extract(&file.bytes, &file.file_name, &file.content_type)
        .await?;
    ok(extract::analyze_redactions(&extraction.text))
}

/// `GET /api/v1/documents/{id}/redactions`: analyze an already-indexed
/// document's stored text.
pub async fn for_document(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> ApiResult<RedactionReport> {
    let id = parse_id(&id)?;
    let document = app.pipeline.index().get_document(id).await?;
    let text = document.text.as_deref().unwrap_or_default();
    ok(extract::analyze_redactions(text))
}
