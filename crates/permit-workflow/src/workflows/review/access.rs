use std::collections::BTreeSet;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use super::status::ReviewStage;
use crate::workflows::error::{ValidationError, WorkflowError};

/// Account type issued by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Public,
    Staff,
    Admin,
    SuperAdmin,
}

impl UserType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Staff => "staff",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }

    pub const fn is_elevated(self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }

    fn parse(raw: &str) -> Option<Self> {
        match normalize(raw).as_str() {
            "public" | "applicant" => Some(Self::Public),
            "staff" => Some(Self::Staff),
            "admin" => Some(Self::Admin),
            "super_admin" | "superadmin" => Some(Self::SuperAdmin),
            _ => None,
        }
    }
}

/// Organisational unit a staff member belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffUnit {
    Registry,
    Compliance,
    Revenue,
    Finance,
    Directorate,
    #[serde(other)]
    Other,
}

impl StaffUnit {
    pub fn parse(raw: &str) -> Self {
        match normalize(raw).as_str() {
            "registry" => Self::Registry,
            "compliance" => Self::Compliance,
            "revenue" => Self::Revenue,
            "finance" => Self::Finance,
            "directorate" => Self::Directorate,
            _ => Self::Other,
        }
    }
}

/// Position held within a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffPosition {
    ManagingDirector,
    Director,
    Manager,
    Officer,
    #[serde(other)]
    Other,
}

impl StaffPosition {
    pub fn parse(raw: &str) -> Self {
        match normalize(raw).as_str() {
            "managing_director" => Self::ManagingDirector,
            "director" => Self::Director,
            "manager" => Self::Manager,
            "officer" => Self::Officer,
            _ => Self::Other,
        }
    }
}

fn normalize(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .replace(['-', ' '], "_")
}

/// Role attributes of the user performing an operation.
///
/// Passed explicitly to every operation; nothing reads an ambient session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActingUser {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub user_type: UserType,
    #[serde(default)]
    pub staff_unit: Option<StaffUnit>,
    #[serde(default)]
    pub staff_position: Option<StaffPosition>,
}

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_TYPE_HEADER: &str = "x-user-type";
pub const STAFF_UNIT_HEADER: &str = "x-staff-unit";
pub const STAFF_POSITION_HEADER: &str = "x-staff-position";

impl ActingUser {
    pub fn staff(
        user_id: impl Into<String>,
        unit: Option<StaffUnit>,
        position: Option<StaffPosition>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            user_type: UserType::Staff,
            staff_unit: unit,
            staff_position: position,
        }
    }

    pub fn public(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            user_type: UserType::Public,
            staff_unit: None,
            staff_position: None,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            user_type: UserType::Admin,
            staff_unit: None,
            staff_position: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Read the identity headers set by the authenticating proxy.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ValidationError> {
        let read = |name: &'static str| -> Result<Option<String>, ValidationError> {
            match headers.get(name) {
                None => Ok(None),
                Some(value) => value
                    .to_str()
                    .map(|text| Some(text.trim().to_string()).filter(|text| !text.is_empty()))
                    .map_err(|_| ValidationError::InvalidHeader {
                        header: name,
                        value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    }),
            }
        };

        let user_id = read(USER_ID_HEADER)?.ok_or(ValidationError::MissingField(USER_ID_HEADER))?;
        let user_type = match read(USER_TYPE_HEADER)? {
            Some(raw) => UserType::parse(&raw).ok_or(ValidationError::InvalidHeader {
                header: USER_TYPE_HEADER,
                value: raw,
            })?,
            None => UserType::Public,
        };

        Ok(Self {
            user_id,
            display_name: read(USER_NAME_HEADER)?,
            user_type,
            staff_unit: read(STAFF_UNIT_HEADER)?.map(|raw| StaffUnit::parse(&raw)),
            staff_position: read(STAFF_POSITION_HEADER)?.map(|raw| StaffPosition::parse(&raw)),
        })
    }

    pub fn stage_access(&self) -> StageAccess {
        resolve_stage_access(self.staff_unit, self.staff_position, self.user_type)
    }

    pub fn is_staff(&self) -> bool {
        self.user_type != UserType::Public
    }

    /// Revenue and finance staff handle fee waivers and manual receipts.
    pub fn can_manage_fees(&self) -> bool {
        self.user_type.is_elevated()
            || matches!(
                self.staff_unit,
                Some(StaffUnit::Revenue) | Some(StaffUnit::Finance)
            )
    }

    pub fn authorize_stage(&self, stage: ReviewStage) -> Result<(), WorkflowError> {
        if self.stage_access().can_edit(stage) {
            Ok(())
        } else {
            Err(WorkflowError::permission_denied(
                &self.user_id,
                format!("edit the {} stage", stage.label()),
            ))
        }
    }

    pub fn authorize_fee_management(&self) -> Result<(), WorkflowError> {
        if self.can_manage_fees() {
            Ok(())
        } else {
            Err(WorkflowError::permission_denied(&self.user_id, "manage fees"))
        }
    }

    /// Staff see every application; a public user only the ones they submitted.
    pub fn authorize_applicant_or_staff(
        &self,
        submitted_by: &str,
        action: impl Into<String>,
    ) -> Result<(), WorkflowError> {
        if self.is_staff() || self.user_id == submitted_by {
            Ok(())
        } else {
            Err(WorkflowError::permission_denied(&self.user_id, action))
        }
    }

    pub fn authorize_staff(&self, action: &str) -> Result<(), WorkflowError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(WorkflowError::permission_denied(&self.user_id, action))
        }
    }
}

/// Stages a user may edit. Every other stage renders read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageAccess {
    /// Admin and super admin accounts edit every stage.
    Elevated,
    Stages(BTreeSet<ReviewStage>),
}

impl StageAccess {
    pub fn none() -> Self {
        Self::Stages(BTreeSet::new())
    }

    pub fn can_edit(&self, stage: ReviewStage) -> bool {
        match self {
            StageAccess::Elevated => true,
            StageAccess::Stages(stages) => stages.contains(&stage),
        }
    }

    pub fn editable_stages(&self) -> Vec<ReviewStage> {
        ReviewStage::ordered()
            .into_iter()
            .filter(|stage| self.can_edit(*stage))
            .collect()
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, StageAccess::Stages(stages) if stages.is_empty())
    }

    pub fn view(&self) -> StageAccessView {
        StageAccessView {
            elevated: matches!(self, StageAccess::Elevated),
            editable_stages: self.editable_stages(),
            read_only: self.is_read_only(),
        }
    }
}

/// Serializable projection of [`StageAccess`] for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageAccessView {
    pub elevated: bool,
    pub editable_stages: Vec<ReviewStage>,
    pub read_only: bool,
}

/// Decide which stages a `(unit, position, user type)` combination may edit.
pub fn resolve_stage_access(
    staff_unit: Option<StaffUnit>,
    staff_position: Option<StaffPosition>,
    user_type: UserType,
) -> StageAccess {
    if user_type.is_elevated() {
        return StageAccess::Elevated;
    }

    let mut stages = BTreeSet::new();
    match staff_unit {
        Some(StaffUnit::Registry) => {
            stages.insert(ReviewStage::Registry);
        }
        Some(StaffUnit::Compliance) => {
            stages.insert(ReviewStage::Compliance);
        }
        Some(StaffUnit::Directorate) => {
            stages.insert(ReviewStage::Directorate);
        }
        Some(StaffUnit::Revenue) | Some(StaffUnit::Finance) | Some(StaffUnit::Other) | None => {}
    }
    if staff_position == Some(StaffPosition::ManagingDirector) {
        stages.insert(ReviewStage::ManagingDirector);
    }

    StageAccess::Stages(stages)
}
