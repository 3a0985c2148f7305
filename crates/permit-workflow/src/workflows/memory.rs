//! Process-local store used by the HTTP service, the demo, and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::error::RepositoryError;
use super::fees::{FeePaymentRecord, FeeRepository};
use super::review::{ApplicationId, ApplicationRecord, ApplicationRepository, PermitStatus};

#[derive(Debug, Default, Clone)]
pub struct InMemoryPermitStore {
    applications: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
    fees: Arc<Mutex<HashMap<ApplicationId, FeePaymentRecord>>>,
}

impl InMemoryPermitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn application_count(&self) -> usize {
        lock(&self.applications).map(|guard| guard.len()).unwrap_or(0)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
}

fn check_version(expected: u64, found: u64) -> Result<(), RepositoryError> {
    if expected == found {
        Ok(())
    } else {
        Err(RepositoryError::VersionMismatch { expected, found })
    }
}

impl ApplicationRepository for InMemoryPermitStore {
    fn insert(&self, mut record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = lock(&self.applications)?;
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        record.version = 1;
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update(
        &self,
        mut record: ApplicationRecord,
        expected_version: u64,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = lock(&self.applications)?;
        let current = guard.get(&record.id).ok_or(RepositoryError::NotFound)?;
        check_version(expected_version, current.version)?;
        record.version = current.version + 1;
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(lock(&self.applications)?.get(id).cloned())
    }

    fn list(
        &self,
        status: Option<PermitStatus>,
        limit: usize,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let guard = lock(&self.applications)?;
        let mut records: Vec<ApplicationRecord> = guard
            .values()
            .filter(|record| status.map_or(true, |status| record.status == status))
            .cloned()
            .collect();
        records.sort_by(|left, right| {
            left.submitted_at
                .cmp(&right.submitted_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        records.truncate(limit);
        Ok(records)
    }
}

impl FeeRepository for InMemoryPermitStore {
    fn insert(&self, mut record: FeePaymentRecord) -> Result<FeePaymentRecord, RepositoryError> {
        let mut guard = lock(&self.fees)?;
        if guard.contains_key(&record.application_id) {
            return Err(RepositoryError::Conflict);
        }
        record.version = 1;
        guard.insert(record.application_id.clone(), record.clone());
        Ok(record)
    }

    fn update(
        &self,
        mut record: FeePaymentRecord,
        expected_version: u64,
    ) -> Result<FeePaymentRecord, RepositoryError> {
        let mut guard = lock(&self.fees)?;
        let current = guard
            .get(&record.application_id)
            .ok_or(RepositoryError::NotFound)?;
        check_version(expected_version, current.version)?;
        record.version = current.version + 1;
        guard.insert(record.application_id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<FeePaymentRecord>, RepositoryError> {
        Ok(lock(&self.fees)?.get(id).cloned())
    }

    fn find_by_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<FeePaymentRecord>, RepositoryError> {
        Ok(lock(&self.fees)?
            .values()
            .find(|record| {
                record
                    .checkout_sessions
                    .iter()
                    .any(|session| session == session_id)
            })
            .cloned())
    }
}
