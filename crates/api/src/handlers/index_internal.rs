use super::{ok, ApiResult};
use crate::error::ApiError;
use crate::App;
use axum::extract::State;
use models::{Document, ErrorCode, Id};
use std::sync::Arc;

/// Internal reindex payload: a document whose binary already lives in
/// storage, with classification supplied by the caller.
#[derive(Debug, serde::Deserialize)]
pub struct IndexDocumentRequest {
    /// Optional; when present it must be a real UUID. Upstreams that mint
    /// pseudo-ids from filename hashes are rejected, not accommodated.
    #[serde(default)]
    pub document_id: Option<String>,
    pub document_path: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub classification_result: Option<models::DocumentMetadata>,
    pub file_name: String,
    pub content_type: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub file_url: Option<String>,
}

/// `POST /api/v1/index/document`: index without running the pipeline.
pub async fn index_document(
    State(app): State<Arc<App>>,
    crate::Authenticated(_claims): crate::Authenticated,
    axum::Json(request): axum::Json<IndexDocumentRequest>,
) -> ApiResult<Document> {
    let id = match request.document_id.as_deref() {
        None => Id::new(),
        Some(raw) => raw.parse().map_err(|_| {
            ApiError::new(
                ErrorCode::InvalidFieldFormat,
                format!("'{raw}' is not a UUID; omit document_id to have one minted"),
            )
            .with_field("document_id")
        })?,
    };

    if let Some(metadata) = &request.classification_result {
        metadata
            .validate()
            .map_err(|err| ApiError::validation(err.to_string(), "classification_result"))?;
    }

    let mut document = Document::new(request.file_name, request.content_type, request.size);
    document.id = id;
    document.text = request.text;
    document.metadata = request.classification_result;
    document.storage_key = Some(request.document_path);
    document.public_url = request.file_url;

    app.pipeline.index().index_document(&document).await?;
    ok(document)
}
