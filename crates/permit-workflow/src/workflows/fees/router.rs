use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use super::calculator::FeeQuery;
use super::repository::{FeeRepository, PaymentGateway};
use super::tracker::{PaymentRequest, PaymentTracker, WaiverRequest};
use super::webhook::SIGNATURE_HEADER;
use crate::workflows::error::WorkflowError;
use crate::workflows::review::{ActingUser, ApplicationId, ApplicationRepository};

type SharedTracker<A, F, G> = Arc<PaymentTracker<A, F, G>>;

/// Router exposing fee quotes, invoices, payments, and the gateway callback.
pub fn fee_router<A, F, G>(tracker: SharedTracker<A, F, G>) -> Router
where
    A: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    G: PaymentGateway + 'static,
{
    Router::new()
        .route("/api/v1/fees/quote", post(quote_handler::<A, F, G>))
        .route(
            "/api/v1/applications/:application_id/fees",
            post(assess_handler::<A, F, G>).get(fees_handler::<A, F, G>),
        )
        .route(
            "/api/v1/applications/:application_id/fees/payments",
            post(payment_handler::<A, F, G>),
        )
        .route(
            "/api/v1/applications/:application_id/fees/waive",
            post(waive_handler::<A, F, G>),
        )
        .route(
            "/api/v1/applications/:application_id/fees/checkout",
            post(checkout_handler::<A, F, G>),
        )
        .route(
            "/api/v1/applications/:application_id/fees/invoice",
            get(invoice_handler::<A, F, G>),
        )
        .route("/api/v1/payments/callback", post(callback_handler::<A, F, G>))
        .with_state(tracker)
}

pub(crate) async fn quote_handler<A, F, G>(
    State(tracker): State<SharedTracker<A, F, G>>,
    axum::Json(query): axum::Json<FeeQuery>,
) -> Response
where
    A: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    G: PaymentGateway + 'static,
{
    (StatusCode::OK, axum::Json(tracker.quote(&query))).into_response()
}

pub(crate) async fn assess_handler<A, F, G>(
    State(tracker): State<SharedTracker<A, F, G>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    A: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    G: PaymentGateway + 'static,
{
    let actor = match ActingUser::from_headers(&headers) {
        Ok(actor) => actor,
        Err(err) => return WorkflowError::from(err).into_response(),
    };
    match tracker.assess_fees(&ApplicationId(application_id), &actor) {
        Ok(record) => (StatusCode::CREATED, axum::Json(record)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn fees_handler<A, F, G>(
    State(tracker): State<SharedTracker<A, F, G>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    A: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    G: PaymentGateway + 'static,
{
    let actor = match ActingUser::from_headers(&headers) {
        Ok(actor) => actor,
        Err(err) => return WorkflowError::from(err).into_response(),
    };
    match tracker.fees_for(&ApplicationId(application_id), &actor) {
        Ok(record) => {
            let payload = json!({
                "outstanding_balance": record.outstanding_balance(),
                "allows_assessment": record.allows_assessment(),
                "record": record,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn payment_handler<A, F, G>(
    State(tracker): State<SharedTracker<A, F, G>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<PaymentRequest>,
) -> Response
where
    A: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    G: PaymentGateway + 'static,
{
    let actor = match ActingUser::from_headers(&headers) {
        Ok(actor) => actor,
        Err(err) => return WorkflowError::from(err).into_response(),
    };
    match tracker.record_payment(&ApplicationId(application_id), request, &actor) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn waive_handler<A, F, G>(
    State(tracker): State<SharedTracker<A, F, G>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<WaiverRequest>,
) -> Response
where
    A: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    G: PaymentGateway + 'static,
{
    let actor = match ActingUser::from_headers(&headers) {
        Ok(actor) => actor,
        Err(err) => return WorkflowError::from(err).into_response(),
    };
    match tracker.waive_fees(&ApplicationId(application_id), request, &actor) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn checkout_handler<A, F, G>(
    State(tracker): State<SharedTracker<A, F, G>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    A: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    G: PaymentGateway + 'static,
{
    let actor = match ActingUser::from_headers(&headers) {
        Ok(actor) => actor,
        Err(err) => return WorkflowError::from(err).into_response(),
    };
    match tracker.start_checkout(&ApplicationId(application_id), &actor) {
        Ok(session) => (StatusCode::CREATED, axum::Json(session)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn invoice_handler<A, F, G>(
    State(tracker): State<SharedTracker<A, F, G>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    A: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    G: PaymentGateway + 'static,
{
    let actor = match ActingUser::from_headers(&headers) {
        Ok(actor) => actor,
        Err(err) => return WorkflowError::from(err).into_response(),
    };
    match tracker.render_invoice(&ApplicationId(application_id), &actor) {
        Ok(document) => {
            let mut response = (StatusCode::OK, document.bytes).into_response();
            let headers = response.headers_mut();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(document.content_type),
            );
            if let Ok(disposition) =
                HeaderValue::from_str(&format!("attachment; filename=\"{}\"", document.file_name))
            {
                headers.insert(header::CONTENT_DISPOSITION, disposition);
            }
            response
        }
        Err(err) => err.into_response(),
    }
}

/// Gateway webhook. The body must carry a valid `x-payment-signature`; anything else is 403.
/// Replays answer 200 with `"outcome": "duplicate"` so the gateway stops retrying.
pub(crate) async fn callback_handler<A, F, G>(
    State(tracker): State<SharedTracker<A, F, G>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    A: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    G: PaymentGateway + 'static,
{
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    match tracker.apply_signed_callback(signature, &body) {
        Ok(outcome) => {
            let record = outcome.record();
            let payload = json!({
                "outcome": outcome.label(),
                "application_id": record.application_id,
                "payment_status": record.payment_status,
                "amount_paid": record.amount_paid,
                "outstanding_balance": record.outstanding_balance(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}
