use super::documents::{parse_id, parse_upload};
use super::{ok, ApiResult};
use crate::error::ApiError;
use crate::App;
use axum::extract::{Multipart, Path, State};
use models::{ErrorCode, IngestSource, Priority};
use pipeline::{BatchResults, BatchStatus, SubmitRequest};
use std::sync::Arc;

#[derive(Debug, serde::Serialize)]
pub struct BatchAccepted {
    pub batch_id: String,
    pub accepted: usize,
    pub rejected: usize,
    pub items: Vec<BatchAdmission>,
}

#[derive(Debug, serde::Serialize)]
pub struct BatchAdmission {
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /api/v1/batch/classify`: admit several files at once at batch
/// priority. Per-file admission failures don't fail the batch.
pub async fn classify(
    State(app): State<Arc<App>>,
    mut multipart: Multipart,
) -> ApiResult<BatchAccepted> {
    let (files, hints) = parse_upload(&mut multipart).await?;
    if files.is_empty() {
        return Err(
            ApiError::new(ErrorCode::MissingRequiredField, "at least one file is required")
                .with_field("files"),
        );
    }

    let file_names: Vec<String> = files.iter().map(|f| f.file_name.clone()).collect();
    let requests = files
        .into_iter()
        .map(|file| SubmitRequest {
            file_name: file.file_name,
            content_type: file.content_type,
            source: IngestSource::Buffer(file.bytes),
            hints: hints.clone(),
            priority: Priority::Normal,
        })
        .collect();

    let (batch_id, admissions) = app.pipeline.submit_batch(requests);

    let items: Vec<BatchAdmission> = file_names
        .into_iter()
        .zip(admissions.iter())
        .map(|(file_name, admission)| match admission {
            Ok(id) => BatchAdmission {
                file_name,
                document_id: Some(id.to_string()),
                error: None,
            },
            Err(err) => BatchAdmission {
                file_name,
                document_id: None,
                error: Some(err.to_string()),
            },
        })
        .collect();

    let accepted = items.iter().filter(|i| i.document_id.is_some()).count();
    ok(BatchAccepted {
        batch_id: batch_id.to_string(),
        accepted,
        rejected: items.len() - accepted,
        items,
    })
}

pub async fn status(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> ApiResult<BatchStatus> {
    let id = parse_id(&id)?;
    match app.pipeline.batch_status(id) {
        Some(status) => ok(status),
        None => Err(ApiError::not_found(format!("batch {id}"))),
    }
}

pub async fn results(
    State(app): State<Arc<App>>,
    Path(id): Path<String>,
) -> ApiResult<BatchResults> {
    let id = parse_id(&id)?;
    match app.pipeline.batch_results(id) {
        Some(results) => ok(results),
        None => Err(ApiError::not_found(format!("batch {id}"))),
    }
}

pub async fn delete(
    State(app): State<Arc<App>>,
    crate::Authenticated(_claims): crate::Authenticated,
    Path(id): Path<String>,
) -> ApiResult<serde_json::Value> {
    let id = parse_id(&id)?;
    if app.pipeline.delete_batch(id) {
        ok(serde_json::json!({ "deleted": id.to_string() }))
    } else {
        Err(ApiError::not_found(format!("batch {id}")))
    }
}
