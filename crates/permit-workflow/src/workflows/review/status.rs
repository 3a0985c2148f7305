use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of a permit application or intent registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermitStatus {
    Submitted,
    UnderReview,
    RegistryApproved,
    RequiresClarification,
    Rejected,
    ComplianceReview,
    ComplianceApproved,
    ComplianceIssues,
    MdReview,
    Approved,
    ApprovedWithConditions,
    Deferred,
    Revoked,
    Cancelled,
}

impl PermitStatus {
    pub const fn ordered() -> [Self; 14] {
        [
            Self::Submitted,
            Self::UnderReview,
            Self::RegistryApproved,
            Self::RequiresClarification,
            Self::Rejected,
            Self::ComplianceReview,
            Self::ComplianceApproved,
            Self::ComplianceIssues,
            Self::MdReview,
            Self::Approved,
            Self::ApprovedWithConditions,
            Self::Deferred,
            Self::Revoked,
            Self::Cancelled,
        ]
    }

    /// Wire value, identical to the serde representation.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::RegistryApproved => "registry_approved",
            Self::RequiresClarification => "requires_clarification",
            Self::Rejected => "rejected",
            Self::ComplianceReview => "compliance_review",
            Self::ComplianceApproved => "compliance_approved",
            Self::ComplianceIssues => "compliance_issues",
            Self::MdReview => "md_review",
            Self::Approved => "approved",
            Self::ApprovedWithConditions => "approved_with_conditions",
            Self::Deferred => "deferred",
            Self::Revoked => "revoked",
            Self::Cancelled => "cancelled",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::UnderReview => "Under Review",
            Self::RegistryApproved => "Registry Approved",
            Self::RequiresClarification => "Requires Clarification",
            Self::Rejected => "Rejected",
            Self::ComplianceReview => "Compliance Review",
            Self::ComplianceApproved => "Compliance Approved",
            Self::ComplianceIssues => "Compliance Issues",
            Self::MdReview => "Managing Director Review",
            Self::Approved => "Approved",
            Self::ApprovedWithConditions => "Approved with Conditions",
            Self::Deferred => "Deferred",
            Self::Revoked => "Revoked",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Statuses reachable in one step, in table order.
    pub fn successors(self) -> Vec<PermitStatus> {
        TRANSITIONS
            .iter()
            .filter(|transition| transition.from == self)
            .map(|transition| transition.to)
            .collect()
    }

    pub fn can_transition_to(self, next: PermitStatus) -> bool {
        transition_owner(self, next).is_some()
    }

    /// A final decision has been recorded; only directorate actions may follow `Approved`.
    pub const fn is_decided(self) -> bool {
        matches!(
            self,
            Self::Approved
                | Self::ApprovedWithConditions
                | Self::Rejected
                | Self::Deferred
                | Self::Revoked
                | Self::Cancelled
        )
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }
}

impl fmt::Display for PermitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permit status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for PermitStatus {
    type Err = UnknownStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ordered()
            .into_iter()
            .find(|status| status.label() == normalized)
            .ok_or_else(|| UnknownStatus(raw.to_string()))
    }
}

/// Role-owned phase of the review workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStage {
    Registry,
    Compliance,
    ManagingDirector,
    Directorate,
}

impl ReviewStage {
    pub const fn ordered() -> [Self; 4] {
        [
            Self::Registry,
            Self::Compliance,
            Self::ManagingDirector,
            Self::Directorate,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Compliance => "compliance",
            Self::ManagingDirector => "managing_director",
            Self::Directorate => "directorate",
        }
    }

    /// Closed set of statuses a submission for this stage may target.
    pub const fn targets(self) -> &'static [PermitStatus] {
        match self {
            Self::Registry => &[
                PermitStatus::UnderReview,
                PermitStatus::RegistryApproved,
                PermitStatus::RequiresClarification,
                PermitStatus::Rejected,
            ],
            Self::Compliance => &[
                PermitStatus::ComplianceReview,
                PermitStatus::ComplianceApproved,
                PermitStatus::ComplianceIssues,
                PermitStatus::MdReview,
            ],
            Self::ManagingDirector => &[
                PermitStatus::Approved,
                PermitStatus::ApprovedWithConditions,
                PermitStatus::Deferred,
                PermitStatus::Rejected,
            ],
            Self::Directorate => &[PermitStatus::Revoked, PermitStatus::Cancelled],
        }
    }

    pub fn accepts_target(self, target: PermitStatus) -> bool {
        self.targets().contains(&target)
    }

    /// Directorate actions have their own operations and carry no assessment payload.
    pub const fn takes_review_payload(self) -> bool {
        !matches!(self, Self::Directorate)
    }
}

impl fmt::Display for ReviewStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ReviewStage {
    type Err = UnknownStage;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "registry" => Ok(Self::Registry),
            "compliance" => Ok(Self::Compliance),
            "managing_director" | "md" => Ok(Self::ManagingDirector),
            "directorate" => Ok(Self::Directorate),
            _ => Err(UnknownStage(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown review stage '{0}'")]
pub struct UnknownStage(pub String);

/// One permitted edge of the workflow and the stage that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: PermitStatus,
    pub to: PermitStatus,
    pub owner: ReviewStage,
}

const fn edge(from: PermitStatus, to: PermitStatus, owner: ReviewStage) -> Transition {
    Transition { from, to, owner }
}

use self::PermitStatus as S;
use self::ReviewStage as Stage;

/// Every permitted transition. Anything absent is rejected.
pub const TRANSITIONS: &[Transition] = &[
    edge(S::Submitted, S::UnderReview, Stage::Registry),
    edge(S::UnderReview, S::RegistryApproved, Stage::Registry),
    edge(S::UnderReview, S::RequiresClarification, Stage::Registry),
    edge(S::UnderReview, S::Rejected, Stage::Registry),
    edge(S::RequiresClarification, S::UnderReview, Stage::Registry),
    edge(S::RegistryApproved, S::ComplianceReview, Stage::Compliance),
    edge(S::ComplianceReview, S::ComplianceApproved, Stage::Compliance),
    edge(S::ComplianceReview, S::ComplianceIssues, Stage::Compliance),
    edge(S::ComplianceIssues, S::ComplianceReview, Stage::Compliance),
    edge(S::ComplianceApproved, S::MdReview, Stage::Compliance),
    edge(S::MdReview, S::Approved, Stage::ManagingDirector),
    edge(S::MdReview, S::ApprovedWithConditions, Stage::ManagingDirector),
    edge(S::MdReview, S::Deferred, Stage::ManagingDirector),
    edge(S::MdReview, S::Rejected, Stage::ManagingDirector),
    edge(S::Approved, S::Revoked, Stage::Directorate),
    edge(S::Approved, S::Cancelled, Stage::Directorate),
];

/// Stage owning the `from -> to` edge, or `None` when the edge is not permitted.
pub fn transition_owner(from: PermitStatus, to: PermitStatus) -> Option<ReviewStage> {
    TRANSITIONS
        .iter()
        .find(|transition| transition.from == from && transition.to == to)
        .map(|transition| transition.owner)
}
