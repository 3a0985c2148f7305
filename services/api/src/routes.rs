use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Extension;
use axum::Json;
use permit_workflow::workflows::fees::{fee_router, FeeRepository, PaymentGateway, PaymentTracker};
use permit_workflow::workflows::review::{
    review_router, ApplicationRepository, Notifier, ReviewWorkflowService,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_permit_routes<R, F, N, G>(
    reviews: Arc<ReviewWorkflowService<R, F, N>>,
    payments: Arc<PaymentTracker<R, F, G>>,
) -> axum::Router
where
    R: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    N: Notifier + 'static,
    G: PaymentGateway + 'static,
{
    review_router(reviews)
        .merge(fee_router(payments))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
