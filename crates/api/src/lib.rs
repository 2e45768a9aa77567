mod auth;
mod error;
mod handlers;

pub use auth::{AuthVerifier, Authenticated, Claims};
pub use error::ApiError;

use axum::routing::{delete, get, post};
use extract::Extractor;
use metrics_exporter_prometheus::PrometheusHandle;
use pipeline::Pipeline;
use std::sync::Arc;

/// Shared state behind every route.
pub struct App {
    pub pipeline: Arc<Pipeline>,
    pub extractor: Arc<Extractor>,
    pub auth: AuthVerifier,
    pub prometheus: PrometheusHandle,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// Install the process-wide metrics recorder. Must happen once, before any
/// counters are touched.
pub fn install_metrics_recorder() -> anyhow::Result<PrometheusHandle> {
    use anyhow::Context;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .set_buckets(&prometheus::exponential_buckets(0.001, 2.5, 12)?)
        .context("computing histogram buckets")?
        .install_recorder()
        .context("installing prometheus recorder")
}

pub fn build_router(app: Arc<App>) -> axum::Router {
    axum::Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health))
        .route("/health/detailed", get(handlers::health::detailed))
        .route("/health/ready", get(handlers::health::ready))
        .route("/health/live", get(handlers::health::live))
        .route("/metrics", get(handlers::health::metrics))
        .route("/api/v1/categorise", post(handlers::documents::categorise))
        .route("/api/v1/search", post(handlers::search::search))
        .route(
            "/api/v1/analyze-redactions",
            post(handlers::redactions::analyze),
        )
        .route(
            "/api/v1/update-metadata",
            post(handlers::documents::update_metadata),
        )
        .route(
            "/api/v1/documents/{id}",
            get(handlers::documents::get_document).delete(handlers::documents::delete_document),
        )
        .route(
            "/api/v1/documents/{id}/redactions",
            get(handlers::redactions::for_document),
        )
        .route(
            "/api/v1/documents/{id}/file",
            get(handlers::documents::serve_file),
        )
        .route("/api/v1/legal-tags", get(handlers::options::legal_tags))
        .route(
            "/api/v1/document-types",
            get(handlers::options::document_types),
        )
        .route(
            "/api/v1/document-stats",
            get(handlers::options::document_stats),
        )
        .route(
            "/api/v1/field-options",
            get(handlers::options::field_options),
        )
        .route(
            "/api/v1/metadata-fields",
            get(handlers::options::metadata_fields),
        )
        .route(
            "/api/v1/metadata-fields/{field}",
            get(handlers::options::metadata_field_values),
        )
        .route("/api/v1/batch/classify", post(handlers::batch::classify))
        .route("/api/v1/batch/{id}/status", get(handlers::batch::status))
        .route("/api/v1/batch/{id}/results", get(handlers::batch::results))
        .route("/api/v1/batch/{id}", delete(handlers::batch::delete))
        .route(
            "/api/v1/index/document",
            post(handlers::index_internal::index_document),
        )
        .layer(axum::extract::DefaultBodyLimit::max(
            // Multipart framing overhead rides on top of the file itself.
            app.pipeline.config().max_file_size as usize + 1024 * 1024,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(app)
}
