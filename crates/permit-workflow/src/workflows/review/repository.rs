use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{ApplicationId, ApplicationRecord};
use super::status::PermitStatus;
use crate::workflows::error::RepositoryError;

/// Storage abstraction for application records.
///
/// `insert` assigns version 1. `update` must compare `expected_version` with the stored
/// version, reject a mismatch with [`RepositoryError::VersionMismatch`], and store the record
/// with the version incremented.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn update(
        &self,
        record: ApplicationRecord,
        expected_version: u64,
    ) -> Result<ApplicationRecord, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    /// Records filtered by status (all when `None`), oldest submission first.
    fn list(
        &self,
        status: Option<PermitStatus>,
        limit: usize,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError>;
}

/// Outbound notification hook invoked after a committed transition.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: TransitionNotice) -> Result<(), NotifyError>;
}

/// Payload handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionNotice {
    pub template: String,
    pub application_id: ApplicationId,
    pub status: PermitStatus,
    pub actor: String,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
