use super::{ok, ApiResult};
use crate::error::ApiError;
use crate::App;
use axum::extract::State;
use models::{ErrorCode, SearchRequest, SearchResponse};
use std::sync::Arc;
use validator::Validate;

/// `POST /api/v1/search`: structured search over the index.
pub async fn search(
    State(app): State<Arc<App>>,
    axum::Json(request): axum::Json<SearchRequest>,
) -> ApiResult<SearchResponse> {
    request
        .validate()
        .map_err(|err| ApiError::new(ErrorCode::Validation, err.to_string()).with_field("size"))?;
    if let Some(range) = &request.date_range {
        range.validate().map_err(|err| {
            ApiError::new(ErrorCode::InvalidSearchQuery, err.to_string()).with_field("date_range")
        })?;
    }

    let response = app.pipeline.index().search(&request).await?;
    ok(response)
}
