//! Permit application review: status machine, stage permissions, and the service that
//! moves applications from registry through compliance and the managing director to
//! directorate sign-off.

pub mod access;
pub mod domain;
pub mod repository;
pub mod router;
pub mod service;
pub mod status;

#[cfg(test)]
mod tests;

pub use access::{
    resolve_stage_access, ActingUser, StaffPosition, StaffUnit, StageAccess, StageAccessView,
    UserType,
};
pub use domain::{
    ApplicationDraft, ApplicationId, ApplicationKind, ApplicationRecord, ApplicationStatusView,
    ApprovalPriority, ClosureRequest, DirectorateApproval, DirectorateDecision,
    DirectorateRequest, DirectorateStatus, DocumentRef, ReviewerRef, StageReview, StageReviews,
    StageSubmission, StatusChange,
};
pub use repository::{ApplicationRepository, Notifier, NotifyError, TransitionNotice};
pub use router::review_router;
pub use service::ReviewWorkflowService;
pub use status::{transition_owner, PermitStatus, ReviewStage, Transition, TRANSITIONS};
