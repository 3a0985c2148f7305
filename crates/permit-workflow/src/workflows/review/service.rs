use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::access::ActingUser;
use super::domain::{
    require, ApplicationDraft, ApplicationId, ApplicationKind, ApplicationRecord,
    ClosureRequest, DirectorateApproval, DirectorateDecision, DirectorateRequest,
    DirectorateStatus, ReviewerRef, StageReview, StageSubmission,
};
use super::repository::{ApplicationRepository, Notifier, TransitionNotice};
use super::status::{transition_owner, PermitStatus, ReviewStage};
use crate::workflows::error::{ConflictError, WorkflowError};
use crate::workflows::fees::FeeRepository;
use crate::workflows::observe;

/// Service driving applications through the role-gated review stages.
///
/// Each operation validates, authorizes, and then commits a single versioned update.
/// Notifications are dispatched after the commit and never undo it.
pub struct ReviewWorkflowService<R, F, N> {
    applications: Arc<R>,
    fees: Arc<F>,
    notifier: Arc<N>,
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id(kind: ApplicationKind) -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("{}-{id:06}", kind.id_prefix()))
}

impl<R, F, N> ReviewWorkflowService<R, F, N>
where
    R: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    N: Notifier + 'static,
{
    pub fn new(applications: Arc<R>, fees: Arc<F>, notifier: Arc<N>) -> Self {
        Self {
            applications,
            fees,
            notifier,
        }
    }

    /// Register a new application or intent in `submitted`.
    pub fn submit(
        &self,
        draft: ApplicationDraft,
        actor: &ActingUser,
    ) -> Result<ApplicationRecord, WorkflowError> {
        observe(
            "submit_application",
            &actor.user_id,
            self.create_application(draft, actor),
        )
    }

    fn create_application(
        &self,
        draft: ApplicationDraft,
        actor: &ActingUser,
    ) -> Result<ApplicationRecord, WorkflowError> {
        draft.validate()?;
        let id = next_application_id(draft.kind);
        let record = ApplicationRecord::from_draft(id, draft, actor, Utc::now());
        let stored = self.applications.insert(record)?;
        info!(
            application_id = %stored.id,
            kind = ?stored.kind,
            activity = %stored.activity_type,
            level = %stored.permit_level,
            "application submitted"
        );
        self.dispatch(&stored, actor, "application_submitted", BTreeMap::new());
        Ok(stored)
    }

    pub fn get(&self, id: &ApplicationId) -> Result<ApplicationRecord, WorkflowError> {
        observe("get_application", &id.0, self.load(id))
    }

    /// Read on behalf of a caller: the applicant who submitted it, or any staff member.
    pub fn view(
        &self,
        id: &ApplicationId,
        actor: &ActingUser,
    ) -> Result<ApplicationRecord, WorkflowError> {
        observe(
            "view_application",
            &id.0,
            self.load(id).and_then(|record| {
                actor.authorize_applicant_or_staff(
                    &record.submitted_by,
                    format!("view application {}", record.id),
                )?;
                Ok(record)
            }),
        )
    }

    pub fn list(
        &self,
        status: Option<PermitStatus>,
        limit: usize,
    ) -> Result<Vec<ApplicationRecord>, WorkflowError> {
        observe(
            "list_applications",
            status.map(PermitStatus::label).unwrap_or("any"),
            self.applications.list(status, limit).map_err(WorkflowError::from),
        )
    }

    /// The review queue is for staff only.
    pub fn list_for(
        &self,
        status: Option<PermitStatus>,
        limit: usize,
        actor: &ActingUser,
    ) -> Result<Vec<ApplicationRecord>, WorkflowError> {
        actor.authorize_staff("list applications")?;
        self.list(status, limit)
    }

    /// Record a stage's assessment and move the application to the submitted target status.
    pub fn submit_stage_review(
        &self,
        stage: ReviewStage,
        id: &ApplicationId,
        submission: StageSubmission,
        actor: &ActingUser,
    ) -> Result<ApplicationRecord, WorkflowError> {
        observe(
            "stage_review",
            &id.0,
            self.apply_stage_review(stage, id, submission, actor),
        )
    }

    fn apply_stage_review(
        &self,
        stage: ReviewStage,
        id: &ApplicationId,
        submission: StageSubmission,
        actor: &ActingUser,
    ) -> Result<ApplicationRecord, WorkflowError> {
        submission.validate(stage)?;
        actor.authorize_stage(stage)?;

        let mut record = self.load(id)?;
        ensure_version(&record, submission.expected_version)?;

        let from = record.status;
        let target = submission.target_status;
        ensure_transition(from, target, stage)?;
        if target == PermitStatus::ComplianceReview {
            self.ensure_fees_settled(id)?;
        }

        let now = Utc::now();
        record.reviews.set(
            stage,
            StageReview {
                assessment: submission.assessment.trim().to_string(),
                remarks: submission
                    .remarks
                    .map(|remarks| remarks.trim().to_string())
                    .filter(|remarks| !remarks.is_empty()),
                proposed_action: submission.proposed_action.trim().to_string(),
                documents: submission.documents,
                reviewer: ReviewerRef::from(actor),
                reviewed_at: now,
            },
        );
        record.move_to(target, Some(stage), actor, now);

        let expected = record.version;
        let stored = self.applications.update(record, expected)?;
        info!(
            application_id = %stored.id,
            stage = stage.label(),
            from = from.label(),
            to = target.label(),
            reviewer = %actor.user_id,
            "stage review recorded"
        );

        let mut details = BTreeMap::new();
        details.insert("stage".to_string(), stage.label().to_string());
        details.insert("from".to_string(), from.label().to_string());
        self.dispatch(&stored, actor, "stage_transition", details);
        Ok(stored)
    }

    /// Managing director hands an approved application to the directorate for sign-off.
    pub fn request_directorate_approval(
        &self,
        id: &ApplicationId,
        request: DirectorateRequest,
        actor: &ActingUser,
    ) -> Result<ApplicationRecord, WorkflowError> {
        observe(
            "request_directorate_approval",
            &id.0,
            self.open_directorate_approval(id, request, actor),
        )
    }

    fn open_directorate_approval(
        &self,
        id: &ApplicationId,
        request: DirectorateRequest,
        actor: &ActingUser,
    ) -> Result<ApplicationRecord, WorkflowError> {
        actor.authorize_stage(ReviewStage::ManagingDirector)?;
        let mut record = self.load(id)?;
        if !matches!(
            record.status,
            PermitStatus::Approved | PermitStatus::ApprovedWithConditions
        ) {
            return Err(ConflictError::NotYetApproved.into());
        }
        if record.directorate.is_some() {
            return Err(ConflictError::DirectorateAlreadyRequested.into());
        }

        let now = Utc::now();
        let priority = request.priority;
        record.directorate = Some(DirectorateApproval::pending(
            priority,
            request.notes,
            ReviewerRef::from(actor),
            now,
        ));
        record.updated_at = now;

        let expected = record.version;
        let stored = self.applications.update(record, expected)?;
        info!(application_id = %stored.id, ?priority, "directorate approval requested");
        self.dispatch(&stored, actor, "directorate_requested", BTreeMap::new());
        Ok(stored)
    }

    pub fn decide_directorate(
        &self,
        id: &ApplicationId,
        decision: DirectorateDecision,
        actor: &ActingUser,
    ) -> Result<ApplicationRecord, WorkflowError> {
        observe(
            "decide_directorate",
            &id.0,
            self.record_directorate_decision(id, decision, actor),
        )
    }

    fn record_directorate_decision(
        &self,
        id: &ApplicationId,
        decision: DirectorateDecision,
        actor: &ActingUser,
    ) -> Result<ApplicationRecord, WorkflowError> {
        decision.validate()?;
        actor.authorize_stage(ReviewStage::Directorate)?;

        let mut record = self.load(id)?;
        let now = Utc::now();
        let outcome = decision.decision;
        record
            .directorate
            .as_mut()
            .ok_or(ConflictError::DirectorateNotRequested)?
            .decide(outcome, decision.notes, ReviewerRef::from(actor), now)?;
        record.updated_at = now;

        let expected = record.version;
        let stored = self.applications.update(record, expected)?;
        info!(
            application_id = %stored.id,
            decision = outcome.label(),
            "directorate decision recorded"
        );
        let mut details = BTreeMap::new();
        details.insert("decision".to_string(), outcome.label().to_string());
        self.dispatch(&stored, actor, "directorate_decision", details);
        Ok(stored)
    }

    /// Managing director executes the approval letter once the directorate has approved.
    pub fn sign_letter(
        &self,
        id: &ApplicationId,
        actor: &ActingUser,
    ) -> Result<ApplicationRecord, WorkflowError> {
        observe("sign_letter", &id.0, self.execute_letter(id, actor))
    }

    fn execute_letter(
        &self,
        id: &ApplicationId,
        actor: &ActingUser,
    ) -> Result<ApplicationRecord, WorkflowError> {
        actor.authorize_stage(ReviewStage::ManagingDirector)?;

        let mut record = self.load(id)?;
        let now = Utc::now();
        record
            .directorate
            .as_mut()
            .ok_or(ConflictError::DirectorateNotRequested)?
            .sign_letter(ReviewerRef::from(actor), now)?;
        record.updated_at = now;

        let expected = record.version;
        let stored = self.applications.update(record, expected)?;
        info!(application_id = %stored.id, signer = %actor.user_id, "approval letter signed");
        self.dispatch(&stored, actor, "approval_letter_signed", BTreeMap::new());
        Ok(stored)
    }

    pub fn revoke(
        &self,
        id: &ApplicationId,
        request: ClosureRequest,
        actor: &ActingUser,
    ) -> Result<ApplicationRecord, WorkflowError> {
        observe(
            "revoke",
            &id.0,
            self.close_approval(id, PermitStatus::Revoked, request, actor),
        )
    }

    pub fn cancel(
        &self,
        id: &ApplicationId,
        request: ClosureRequest,
        actor: &ActingUser,
    ) -> Result<ApplicationRecord, WorkflowError> {
        observe(
            "cancel",
            &id.0,
            self.close_approval(id, PermitStatus::Cancelled, request, actor),
        )
    }

    fn close_approval(
        &self,
        id: &ApplicationId,
        target: PermitStatus,
        request: ClosureRequest,
        actor: &ActingUser,
    ) -> Result<ApplicationRecord, WorkflowError> {
        require("reason", &request.reason)?;
        actor.authorize_stage(ReviewStage::Directorate)?;

        let mut record = self.load(id)?;
        ensure_transition(record.status, target, ReviewStage::Directorate)?;

        let closed = if target == PermitStatus::Revoked {
            DirectorateStatus::Revoked
        } else {
            DirectorateStatus::Cancelled
        };
        let reason = request.reason.trim().to_string();
        if let Some(approval) = record.directorate.as_mut() {
            approval.close(closed, Some(reason.clone()));
        }
        record.move_to(target, Some(ReviewStage::Directorate), actor, Utc::now());

        let expected = record.version;
        let stored = self.applications.update(record, expected)?;
        info!(application_id = %stored.id, status = target.label(), "approval closed by directorate");

        let mut details = BTreeMap::new();
        details.insert("reason".to_string(), reason);
        self.dispatch(&stored, actor, "approval_closed", details);
        Ok(stored)
    }

    fn load(&self, id: &ApplicationId) -> Result<ApplicationRecord, WorkflowError> {
        self.applications
            .fetch(id)?
            .ok_or_else(|| WorkflowError::not_found("application", id.0.clone()))
    }

    /// Assessment work may only start once fees are paid in full or waived.
    fn ensure_fees_settled(&self, id: &ApplicationId) -> Result<(), WorkflowError> {
        let fees = self
            .fees
            .fetch(id)?
            .ok_or(ConflictError::FeesNotAssessed)?;
        if fees.allows_assessment() {
            Ok(())
        } else {
            Err(ConflictError::PaymentOutstanding {
                status: fees.payment_status,
                outstanding: fees.outstanding_balance(),
            }
            .into())
        }
    }

    fn dispatch(
        &self,
        record: &ApplicationRecord,
        actor: &ActingUser,
        template: &str,
        details: BTreeMap<String, String>,
    ) {
        let notice = TransitionNotice {
            template: template.to_string(),
            application_id: record.id.clone(),
            status: record.status,
            actor: actor.user_id.clone(),
            details,
        };
        if let Err(err) = self.notifier.notify(notice) {
            warn!(
                application_id = %record.id,
                template,
                error = %err,
                "notification failed after commit"
            );
        }
    }
}

fn ensure_version(record: &ApplicationRecord, expected: Option<u64>) -> Result<(), ConflictError> {
    match expected {
        Some(expected) if expected != record.version => Err(ConflictError::StaleVersion {
            expected,
            found: record.version,
        }),
        _ => Ok(()),
    }
}

fn ensure_transition(
    from: PermitStatus,
    to: PermitStatus,
    stage: ReviewStage,
) -> Result<(), ConflictError> {
    match transition_owner(from, to) {
        Some(owner) if owner == stage => Ok(()),
        _ => Err(ConflictError::InvalidTransition { from, to }),
    }
}
