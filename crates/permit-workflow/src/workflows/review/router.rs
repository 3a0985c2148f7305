use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::access::ActingUser;
use super::domain::{
    ApplicationDraft, ApplicationId, ApplicationRecord, ApplicationStatusView, ClosureRequest,
    DirectorateDecision, DirectorateRequest, StageSubmission,
};
use super::repository::{ApplicationRepository, Notifier};
use super::service::ReviewWorkflowService;
use super::status::{PermitStatus, ReviewStage};
use crate::workflows::error::{ValidationError, WorkflowError};
use crate::workflows::fees::FeeRepository;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 200;

type SharedService<R, F, N> = Arc<ReviewWorkflowService<R, F, N>>;

/// Router exposing intake, stage reviews, and directorate sign-off.
pub fn review_router<R, F, N>(service: SharedService<R, F, N>) -> Router
where
    R: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route(
            "/api/v1/applications",
            post(submit_handler::<R, F, N>).get(list_handler::<R, F, N>),
        )
        .route(
            "/api/v1/applications/:application_id",
            get(get_handler::<R, F, N>),
        )
        .route(
            "/api/v1/applications/:application_id/access",
            get(access_handler::<R, F, N>),
        )
        .route(
            "/api/v1/applications/:application_id/reviews/:stage",
            post(stage_review_handler::<R, F, N>),
        )
        .route(
            "/api/v1/applications/:application_id/directorate/request",
            post(directorate_request_handler::<R, F, N>),
        )
        .route(
            "/api/v1/applications/:application_id/directorate/decision",
            post(directorate_decision_handler::<R, F, N>),
        )
        .route(
            "/api/v1/applications/:application_id/directorate/sign",
            post(sign_letter_handler::<R, F, N>),
        )
        .route(
            "/api/v1/applications/:application_id/directorate/revoke",
            post(revoke_handler::<R, F, N>),
        )
        .route(
            "/api/v1/applications/:application_id/directorate/cancel",
            post(cancel_handler::<R, F, N>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

pub(crate) async fn submit_handler<R, F, N>(
    State(service): State<SharedService<R, F, N>>,
    headers: HeaderMap,
    axum::Json(draft): axum::Json<ApplicationDraft>,
) -> Response
where
    R: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    N: Notifier + 'static,
{
    let actor = match ActingUser::from_headers(&headers) {
        Ok(actor) => actor,
        Err(err) => return WorkflowError::from(err).into_response(),
    };
    match service.submit(draft, &actor) {
        Ok(record) => (StatusCode::CREATED, axum::Json(record.status_view())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn list_handler<R, F, N>(
    State(service): State<SharedService<R, F, N>>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    N: Notifier + 'static,
{
    let actor = match ActingUser::from_headers(&headers) {
        Ok(actor) => actor,
        Err(err) => return WorkflowError::from(err).into_response(),
    };
    let status = match query.status.as_deref().map(str::parse::<PermitStatus>) {
        None => None,
        Some(Ok(status)) => Some(status),
        Some(Err(err)) => {
            return WorkflowError::from(ValidationError::UnknownValue {
                field: "status",
                value: err.0,
            })
            .into_response()
        }
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    match service.list_for(status, limit, &actor) {
        Ok(records) => {
            let views: Vec<ApplicationStatusView> =
                records.iter().map(ApplicationRecord::status_view).collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn get_handler<R, F, N>(
    State(service): State<SharedService<R, F, N>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    N: Notifier + 'static,
{
    let actor = match ActingUser::from_headers(&headers) {
        Ok(actor) => actor,
        Err(err) => return WorkflowError::from(err).into_response(),
    };
    match service.view(&ApplicationId(application_id), &actor) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Which stage forms the caller may edit for this application; everything else is read-only.
pub(crate) async fn access_handler<R, F, N>(
    State(service): State<SharedService<R, F, N>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    N: Notifier + 'static,
{
    let actor = match ActingUser::from_headers(&headers) {
        Ok(actor) => actor,
        Err(err) => return WorkflowError::from(err).into_response(),
    };
    match service.view(&ApplicationId(application_id), &actor) {
        Ok(record) => {
            let payload = json!({
                "application": record.status_view(),
                "access": actor.stage_access().view(),
                "can_manage_fees": actor.can_manage_fees(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn stage_review_handler<R, F, N>(
    State(service): State<SharedService<R, F, N>>,
    Path((application_id, stage)): Path<(String, String)>,
    headers: HeaderMap,
    axum::Json(submission): axum::Json<StageSubmission>,
) -> Response
where
    R: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    N: Notifier + 'static,
{
    let stage = match stage.parse::<ReviewStage>() {
        Ok(stage) => stage,
        Err(err) => {
            return WorkflowError::from(ValidationError::UnknownValue {
                field: "stage",
                value: err.0,
            })
            .into_response()
        }
    };
    let actor = match ActingUser::from_headers(&headers) {
        Ok(actor) => actor,
        Err(err) => return WorkflowError::from(err).into_response(),
    };
    let id = ApplicationId(application_id);
    match service.submit_stage_review(stage, &id, submission, &actor) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn directorate_request_handler<R, F, N>(
    State(service): State<SharedService<R, F, N>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<DirectorateRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    N: Notifier + 'static,
{
    let actor = match ActingUser::from_headers(&headers) {
        Ok(actor) => actor,
        Err(err) => return WorkflowError::from(err).into_response(),
    };
    let id = ApplicationId(application_id);
    record_response(service.request_directorate_approval(&id, request, &actor))
}

pub(crate) async fn directorate_decision_handler<R, F, N>(
    State(service): State<SharedService<R, F, N>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    axum::Json(decision): axum::Json<DirectorateDecision>,
) -> Response
where
    R: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    N: Notifier + 'static,
{
    let actor = match ActingUser::from_headers(&headers) {
        Ok(actor) => actor,
        Err(err) => return WorkflowError::from(err).into_response(),
    };
    let id = ApplicationId(application_id);
    record_response(service.decide_directorate(&id, decision, &actor))
}

pub(crate) async fn sign_letter_handler<R, F, N>(
    State(service): State<SharedService<R, F, N>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    N: Notifier + 'static,
{
    let actor = match ActingUser::from_headers(&headers) {
        Ok(actor) => actor,
        Err(err) => return WorkflowError::from(err).into_response(),
    };
    record_response(service.sign_letter(&ApplicationId(application_id), &actor))
}

pub(crate) async fn revoke_handler<R, F, N>(
    State(service): State<SharedService<R, F, N>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ClosureRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    N: Notifier + 'static,
{
    let actor = match ActingUser::from_headers(&headers) {
        Ok(actor) => actor,
        Err(err) => return WorkflowError::from(err).into_response(),
    };
    record_response(service.revoke(&ApplicationId(application_id), request, &actor))
}

pub(crate) async fn cancel_handler<R, F, N>(
    State(service): State<SharedService<R, F, N>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ClosureRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    N: Notifier + 'static,
{
    let actor = match ActingUser::from_headers(&headers) {
        Ok(actor) => actor,
        Err(err) => return WorkflowError::from(err).into_response(),
    };
    record_response(service.cancel(&ApplicationId(application_id), request, &actor))
}

fn record_response(result: Result<ApplicationRecord, WorkflowError>) -> Response {
    match result {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(err) => err.into_response(),
    }
}
