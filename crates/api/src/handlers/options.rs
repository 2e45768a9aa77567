use super::{ok, ApiResult};
use crate::error::ApiError;
use crate::App;
use axum::extract::{Path, Query, State};
use models::{DocumentType, ErrorCode};
use search::DocumentStats;
use std::sync::Arc;

/// Metadata fields that expose distinct-value listings, with their index
/// fields.
const FIELD_MAP: &[(&str, &str)] = &[
    ("legal_tags", "metadata.legal_tags"),
    ("category", "metadata.category"),
    ("document_type", "metadata.document_type"),
    ("court", "metadata.court_name.keyword"),
    ("judge", "metadata.judge_name.keyword"),
    ("author", "metadata.author.keyword"),
    ("status", "metadata.status"),
    ("language", "metadata.language"),
];

pub async fn legal_tags(State(app): State<Arc<App>>) -> ApiResult<Vec<String>> {
    let tags = app
        .pipeline
        .index()
        .field_options("metadata.legal_tags", None, 200)
        .await?;
    ok(tags)
}

pub async fn document_types(State(app): State<Arc<App>>) -> ApiResult<serde_json::Value> {
    let types: Vec<String> = DocumentType::all().iter().map(|t| t.to_string()).collect();
    let categories: Vec<&str> = app.pipeline.chain().supported_categories();
    ok(serde_json::json!({
        "document_types": types,
        "categories": categories,
    }))
}

pub async fn document_stats(State(app): State<Arc<App>>) -> ApiResult<DocumentStats> {
    let stats = app.pipeline.index().stats().await?;
    ok(stats)
}

/// Distinct values for every filterable field at once, for populating
/// filter dropdowns in one round trip.
pub async fn field_options(State(app): State<Arc<App>>) -> ApiResult<serde_json::Value> {
    let mut options = serde_json::Map::new();
    for (name, index_field) in FIELD_MAP {
        let values = app
            .pipeline
            .index()
            .field_options(index_field, None, 50)
            .await?;
        options.insert((*name).to_string(), serde_json::json!(values));
    }
    ok(serde_json::Value::Object(options))
}

pub async fn metadata_fields(State(_app): State<Arc<App>>) -> ApiResult<Vec<&'static str>> {
    ok(FIELD_MAP.iter().map(|(name, _)| *name).collect())
}

#[derive(Debug, serde::Deserialize)]
pub struct FieldValuesQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn metadata_field_values(
    State(app): State<Arc<App>>,
    Path(field): Path<String>,
    Query(query): Query<FieldValuesQuery>,
) -> ApiResult<Vec<String>> {
    let index_field = FIELD_MAP
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, index_field)| *index_field)
        .ok_or_else(|| {
            ApiError::new(
                ErrorCode::InvalidFieldValue,
                format!("'{field}' is not a listable metadata field"),
            )
            .with_field("field")
        })?;

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let values = app
        .pipeline
        .index()
        .field_options(index_field, query.search.as_deref(), limit)
        .await?;
    ok(values)
}
