pub mod batch;
pub mod documents;
pub mod health;
pub mod index_internal;
pub mod options;
pub mod redactions;
pub mod search;

use super::error::ApiError;
use models::ApiResponse;

pub type ApiResult<T> = Result<axum::Json<ApiResponse<T>>, ApiError>;

pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(axum::Json(ApiResponse::ok(data)))
}
