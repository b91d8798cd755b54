use axum::extract::DefaultBodyLimit;
use axum::Extension;
use axum::response::Html;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod health;
pub mod metrics;
pub mod products;
pub mod voice;
pub mod webhook;

/// Multipart framing allowance on top of the upload size limit.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Largest accepted upload file, checked per file by the upload handler.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

/// Dashboard UI, embedded at compile time.
async fn dashboard() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

/// Assemble the HTTP surface. `/metrics` is only mounted when a Prometheus
/// recorder has been installed.
pub fn build_router(
    state: AppState,
    max_upload_bytes: usize,
    prometheus: Option<Arc<PrometheusHandle>>,
) -> Router {
    let api = Router::new()
        .route("/products", get(products::list_products))
        .route("/products/upload", post(products::upload_product))
        .route("/voice/extract", post(voice::submit_extract))
        .route("/voice/clone", post(voice::submit_clone))
        .route("/voice/jobs/{id}", get(voice::get_job))
        .route("/voice/audio/{job_id}", get(voice::get_audio))
        .route("/voice/speak", post(voice::speak));

    let mut app = Router::new()
        .route("/", get(dashboard))
        .route("/dashboard", get(dashboard))
        .route("/health", get(health::health_check))
        .route("/webhook/telegram", post(webhook::telegram_webhook))
        .nest("/api", api)
        .with_state(state);

    if let Some(handle) = prometheus {
        app = app.route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(handle),
        );
    }

    let body_limit = max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    app.layer(Extension(UploadLimit(max_upload_bytes)))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(body_limit))
}
