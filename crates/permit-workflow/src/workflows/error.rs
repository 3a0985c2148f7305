use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde_json::json;

use super::fees::PaymentStatus;
use super::review::{PermitStatus, ReviewStage};

/// Error surfaced by every workflow operation.
///
/// Validation and permission failures are resolved at the boundary and never reach the
/// store. Upstream failures leave state untouched and may be retried by resubmitting.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("permission denied: {user_id} may not {action}")]
    PermissionDenied { user_id: String, action: String },
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl WorkflowError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn permission_denied(user_id: &str, action: impl Into<String>) -> Self {
        Self::PermissionDenied {
            user_id: user_id.to_string(),
            action: action.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WorkflowError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
            WorkflowError::Conflict(_) => StatusCode::CONFLICT,
            WorkflowError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Validation(_) => "validation_error",
            WorkflowError::PermissionDenied { .. } => "permission_denied",
            WorkflowError::NotFound { .. } => "not_found",
            WorkflowError::Conflict(_) => "conflict",
            WorkflowError::Upstream(_) => "upstream_error",
        }
    }

    /// Upstream failures are transient; everything else needs the caller to change the request.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::Upstream(_))
    }
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "retryable": self.is_retryable(),
        }));
        (status, body).into_response()
    }
}

/// Missing or malformed input. Never reaches the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{} is not a status the {} stage may set", .target.label(), .stage.label())]
    TargetNotOwnedByStage {
        stage: ReviewStage,
        target: PermitStatus,
    },
    #[error("the {} stage does not accept review submissions", .0.label())]
    UnsupportedStage(ReviewStage),
    #[error("payment amount must be positive (found {0})")]
    NonPositiveAmount(Decimal),
    #[error("invalid {header} header: '{value}'")]
    InvalidHeader { header: &'static str, value: String },
    #[error("directorate decision must be approved or rejected")]
    InvalidDecision,
    #[error("unknown {field} '{value}'")]
    UnknownValue { field: &'static str, value: String },
    #[error("request body could not be parsed: {0}")]
    MalformedBody(String),
}

/// Request is well formed but contradicts the current state of the record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    #[error("cannot move from {} to {}", .from.label(), .to.label())]
    InvalidTransition { from: PermitStatus, to: PermitStatus },
    #[error("fees have not been assessed for this application")]
    FeesNotAssessed,
    #[error("assessment blocked while payment is {} (outstanding {})", .status.label(), .outstanding)]
    PaymentOutstanding {
        status: PaymentStatus,
        outstanding: Decimal,
    },
    #[error("payment of {attempted} exceeds outstanding balance {outstanding}")]
    Overpayment {
        attempted: Decimal,
        outstanding: Decimal,
    },
    #[error("fees were waived; no further payments are accepted")]
    FeesWaived,
    #[error("nothing is outstanding on this invoice")]
    NothingOutstanding,
    #[error("fees are already settled and cannot be waived")]
    AlreadySettled,
    #[error("record changed since version {expected} (now {found})")]
    StaleVersion { expected: u64, found: u64 },
    #[error("record already exists")]
    AlreadyExists,
    #[error("directorate approval has not been requested")]
    DirectorateNotRequested,
    #[error("directorate approval was already requested")]
    DirectorateAlreadyRequested,
    #[error("directorate approval can only be requested once the application is approved")]
    NotYetApproved,
    #[error("directorate decision already recorded")]
    DirectorateAlreadyDecided,
    #[error("approval letter can only be signed after directorate approval")]
    LetterNotApproved,
    #[error("approval letter already signed")]
    LetterAlreadySigned,
}

/// Data store or payment gateway failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("data store unavailable: {0}")]
    Store(String),
    #[error("payment gateway unavailable: {0}")]
    Gateway(String),
    #[error("invoice renderer failed: {0}")]
    Renderer(String),
}

/// Error returned by repository implementations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u64, found: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl From<RepositoryError> for WorkflowError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict => ConflictError::AlreadyExists.into(),
            RepositoryError::NotFound => WorkflowError::not_found("record", "unknown"),
            RepositoryError::VersionMismatch { expected, found } => {
                ConflictError::StaleVersion { expected, found }.into()
            }
            RepositoryError::Unavailable(reason) => UpstreamError::Store(reason).into(),
        }
    }
}
