use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::access::ActingUser;
use super::status::{PermitStatus, ReviewStage};
use crate::workflows::error::{ConflictError, ValidationError};

/// Identifier wrapper for permit applications and intent registrations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationKind {
    /// Environmental permit application.
    Permit,
    /// Intent-to-operate registration.
    Intent,
}

impl ApplicationKind {
    pub const fn id_prefix(self) -> &'static str {
        match self {
            Self::Permit => "PRM",
            Self::Intent => "INT",
        }
    }
}

/// Reference to an uploaded document held by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub name: String,
    pub storage_key: String,
}

/// Applicant submission creating a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationDraft {
    pub kind: ApplicationKind,
    pub entity_reference: String,
    pub applicant_name: String,
    pub activity_type: String,
    pub permit_level: String,
    #[serde(default)]
    pub activity_category: Option<String>,
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
}

impl ApplicationDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("entity_reference", &self.entity_reference)?;
        require("applicant_name", &self.applicant_name)?;
        require("activity_type", &self.activity_type)?;
        require("permit_level", &self.permit_level)?;
        Ok(())
    }
}

pub(crate) fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

/// Who performed a review action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerRef {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl From<&ActingUser> for ReviewerRef {
    fn from(user: &ActingUser) -> Self {
        Self {
            user_id: user.user_id.clone(),
            display_name: user.display_name.clone(),
        }
    }
}

/// Staff input for one stage of the review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSubmission {
    pub assessment: String,
    #[serde(default)]
    pub remarks: Option<String>,
    pub proposed_action: String,
    pub target_status: PermitStatus,
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
    /// Version the reviewer's form was loaded from; stale forms are rejected.
    #[serde(default)]
    pub expected_version: Option<u64>,
}

impl StageSubmission {
    pub fn validate(&self, stage: ReviewStage) -> Result<(), ValidationError> {
        if !stage.takes_review_payload() {
            return Err(ValidationError::UnsupportedStage(stage));
        }
        require("assessment", &self.assessment)?;
        require("proposed_action", &self.proposed_action)?;
        if !stage.accepts_target(self.target_status) {
            return Err(ValidationError::TargetNotOwnedByStage {
                stage,
                target: self.target_status,
            });
        }
        Ok(())
    }
}

/// Persisted review payload for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReview {
    pub assessment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    pub proposed_action: String,
    pub documents: Vec<DocumentRef>,
    pub reviewer: ReviewerRef,
    pub reviewed_at: DateTime<Utc>,
}

/// One optional payload per reviewing stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReviews {
    pub registry: Option<StageReview>,
    pub compliance: Option<StageReview>,
    pub managing_director: Option<StageReview>,
}

impl StageReviews {
    pub fn get(&self, stage: ReviewStage) -> Option<&StageReview> {
        match stage {
            ReviewStage::Registry => self.registry.as_ref(),
            ReviewStage::Compliance => self.compliance.as_ref(),
            ReviewStage::ManagingDirector => self.managing_director.as_ref(),
            ReviewStage::Directorate => None,
        }
    }

    pub(crate) fn set(&mut self, stage: ReviewStage, review: StageReview) {
        match stage {
            ReviewStage::Registry => self.registry = Some(review),
            ReviewStage::Compliance => self.compliance = Some(review),
            ReviewStage::ManagingDirector => self.managing_director = Some(review),
            ReviewStage::Directorate => {}
        }
    }
}

/// Audit entry appended on every status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: Option<PermitStatus>,
    pub to: PermitStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<ReviewStage>,
    pub actor: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectorateStatus {
    Pending,
    Approved,
    Rejected,
    Revoked,
    Cancelled,
}

impl DirectorateStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Revoked => "revoked",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Final sign-off tracked by the directorate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorateApproval {
    pub approval_status: DirectorateStatus,
    pub priority: ApprovalPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub requested_by: ReviewerRef,
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<ReviewerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    pub letter_signed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_by: Option<ReviewerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<DateTime<Utc>>,
}

impl DirectorateApproval {
    pub fn pending(
        priority: ApprovalPriority,
        notes: Option<String>,
        requested_by: ReviewerRef,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            approval_status: DirectorateStatus::Pending,
            priority,
            notes,
            requested_by,
            requested_at: at,
            decided_by: None,
            decided_at: None,
            letter_signed: false,
            signed_by: None,
            signed_at: None,
        }
    }

    pub(crate) fn decide(
        &mut self,
        decision: DirectorateStatus,
        notes: Option<String>,
        by: ReviewerRef,
        at: DateTime<Utc>,
    ) -> Result<(), ConflictError> {
        if self.approval_status != DirectorateStatus::Pending {
            return Err(ConflictError::DirectorateAlreadyDecided);
        }
        self.approval_status = decision;
        if notes.is_some() {
            self.notes = notes;
        }
        self.decided_by = Some(by);
        self.decided_at = Some(at);
        Ok(())
    }

    pub(crate) fn sign_letter(&mut self, by: ReviewerRef, at: DateTime<Utc>) -> Result<(), ConflictError> {
        if self.approval_status != DirectorateStatus::Approved {
            return Err(ConflictError::LetterNotApproved);
        }
        if self.letter_signed {
            return Err(ConflictError::LetterAlreadySigned);
        }
        self.letter_signed = true;
        self.signed_by = Some(by);
        self.signed_at = Some(at);
        Ok(())
    }

    pub(crate) fn close(&mut self, status: DirectorateStatus, notes: Option<String>) {
        self.approval_status = status;
        if notes.is_some() {
            self.notes = notes;
        }
    }
}

/// Stored permit application or intent registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub kind: ApplicationKind,
    pub entity_reference: String,
    pub applicant_name: String,
    pub activity_type: String,
    pub permit_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_category: Option<String>,
    pub documents: Vec<DocumentRef>,
    pub status: PermitStatus,
    pub reviews: StageReviews,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directorate: Option<DirectorateApproval>,
    pub history: Vec<StatusChange>,
    /// Optimistic concurrency token, bumped by the store on every update.
    pub version: u64,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRecord {
    pub fn from_draft(
        id: ApplicationId,
        draft: ApplicationDraft,
        submitted_by: &ActingUser,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind: draft.kind,
            entity_reference: draft.entity_reference.trim().to_string(),
            applicant_name: draft.applicant_name.trim().to_string(),
            activity_type: draft.activity_type.trim().to_string(),
            permit_level: draft.permit_level.trim().to_string(),
            activity_category: draft
                .activity_category
                .map(|category| category.trim().to_string())
                .filter(|category| !category.is_empty()),
            documents: draft.documents,
            status: PermitStatus::Submitted,
            reviews: StageReviews::default(),
            directorate: None,
            history: vec![StatusChange {
                from: None,
                to: PermitStatus::Submitted,
                stage: None,
                actor: submitted_by.user_id.clone(),
                at,
            }],
            version: 0,
            submitted_by: submitted_by.user_id.clone(),
            submitted_at: at,
            updated_at: at,
        }
    }

    pub(crate) fn move_to(
        &mut self,
        to: PermitStatus,
        stage: Option<ReviewStage>,
        actor: &ActingUser,
        at: DateTime<Utc>,
    ) {
        self.history.push(StatusChange {
            from: Some(self.status),
            to,
            stage,
            actor: actor.user_id.clone(),
            at,
        });
        self.status = to;
        self.updated_at = at;
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.id.clone(),
            status: self.status.label(),
            status_label: self.status.display_name(),
            next_statuses: self
                .status
                .successors()
                .into_iter()
                .map(PermitStatus::label)
                .collect(),
            version: self.version,
            letter_signed: self
                .directorate
                .as_ref()
                .map(|approval| approval.letter_signed)
                .unwrap_or(false),
        }
    }
}

/// Compact status projection for list views and API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub status: &'static str,
    pub status_label: &'static str,
    pub next_statuses: Vec<&'static str>,
    pub version: u64,
    pub letter_signed: bool,
}

/// Managing director's request for final directorate sign-off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorateRequest {
    #[serde(default)]
    pub priority: ApprovalPriority,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Directorate decision on a pending sign-off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorateDecision {
    pub decision: DirectorateStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

impl DirectorateDecision {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.decision {
            DirectorateStatus::Approved | DirectorateStatus::Rejected => Ok(()),
            _ => Err(ValidationError::InvalidDecision),
        }
    }
}

/// Reason recorded when an approved permit is revoked or cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureRequest {
    pub reason: String,
}
