use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::Utc;
use serde_json::Value;

use crate::workflows::error::RepositoryError;
use crate::workflows::fees::{
    FeeCalculator, FeePaymentRecord, FeeQuery, FeeRepository, FeeSchedule, PaymentStatus,
};
use crate::workflows::memory::InMemoryPermitStore;
use crate::workflows::review::{
    review_router, ActingUser, ApplicationDraft, ApplicationId, ApplicationKind,
    ApplicationRecord, ApplicationRepository, DocumentRef, Notifier, NotifyError, PermitStatus,
    ReviewStage, ReviewWorkflowService, StaffPosition, StaffUnit, StageSubmission,
    TransitionNotice,
};

pub(super) type TestService =
    ReviewWorkflowService<InMemoryPermitStore, InMemoryPermitStore, RecordingNotifier>;

pub(super) fn build_service() -> (TestService, Arc<InMemoryPermitStore>, Arc<RecordingNotifier>) {
    let store = Arc::new(InMemoryPermitStore::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = ReviewWorkflowService::new(store.clone(), store.clone(), notifier.clone());
    (service, store, notifier)
}

pub(super) fn draft() -> ApplicationDraft {
    ApplicationDraft {
        kind: ApplicationKind::Permit,
        entity_reference: "ENT-4471".to_string(),
        applicant_name: "Highlands Gold Ltd".to_string(),
        activity_type: "Mining".to_string(),
        permit_level: "Level 2".to_string(),
        activity_category: None,
        documents: vec![DocumentRef {
            name: "Environmental inception report".to_string(),
            storage_key: "permits/ENT-4471/inception.pdf".to_string(),
        }],
    }
}

pub(super) fn applicant() -> ActingUser {
    ActingUser::public("applicant-1").with_display_name("Mary Kila")
}

pub(super) fn registry_officer() -> ActingUser {
    ActingUser::staff("reg-1", Some(StaffUnit::Registry), Some(StaffPosition::Officer))
}

pub(super) fn compliance_officer() -> ActingUser {
    ActingUser::staff(
        "comp-1",
        Some(StaffUnit::Compliance),
        Some(StaffPosition::Officer),
    )
}

pub(super) fn managing_director() -> ActingUser {
    ActingUser::staff("md-1", None, Some(StaffPosition::ManagingDirector))
}

pub(super) fn directorate_officer() -> ActingUser {
    ActingUser::staff(
        "dir-1",
        Some(StaffUnit::Directorate),
        Some(StaffPosition::Director),
    )
}

pub(super) fn submission(target: PermitStatus) -> StageSubmission {
    StageSubmission {
        assessment: "Documents complete and consistent".to_string(),
        remarks: Some("Site plan verified".to_string()),
        proposed_action: "Proceed".to_string(),
        target_status: target,
        documents: Vec::new(),
        expected_version: None,
    }
}

pub(super) fn fetch_application(store: &InMemoryPermitStore, id: &ApplicationId) -> ApplicationRecord {
    ApplicationRepository::fetch(store, id)
        .expect("fetch succeeds")
        .expect("record present")
}

/// Create the invoice for `id` with the given payment status.
pub(super) fn seed_fees(store: &InMemoryPermitStore, id: &ApplicationId, status: PaymentStatus) {
    let calculator = FeeCalculator::new(Arc::new(FeeSchedule::standard()));
    let calculation = calculator
        .calculate(&FeeQuery::new("Mining", "Level 2"))
        .calculation()
        .cloned()
        .expect("mining level 2 is scheduled");
    let mut record = FeePaymentRecord::from_calculation(
        id.clone(),
        "INV-TEST-000001".to_string(),
        "PGK",
        &calculation,
        Utc::now(),
    );
    record.payment_status = status;
    if status == PaymentStatus::Paid {
        record.amount_paid = record.total_fee;
    }
    FeeRepository::insert(store, record).expect("fee record stored");
}

/// Submit an application and walk it through the workflow until it reaches `target`.
pub(super) fn advance_to(
    service: &TestService,
    store: &InMemoryPermitStore,
    target: PermitStatus,
) -> ApplicationRecord {
    let record = service.submit(draft(), &applicant()).expect("submission succeeds");
    let id = record.id.clone();
    let path: &[(ReviewStage, PermitStatus, ActingUser)] = &[
        (ReviewStage::Registry, PermitStatus::UnderReview, registry_officer()),
        (ReviewStage::Registry, PermitStatus::RegistryApproved, registry_officer()),
        (ReviewStage::Compliance, PermitStatus::ComplianceReview, compliance_officer()),
        (ReviewStage::Compliance, PermitStatus::ComplianceApproved, compliance_officer()),
        (ReviewStage::Compliance, PermitStatus::MdReview, compliance_officer()),
        (ReviewStage::ManagingDirector, PermitStatus::Approved, managing_director()),
    ];

    let mut current = record;
    for (stage, status, actor) in path {
        if current.status == target {
            break;
        }
        if *status == PermitStatus::ComplianceReview {
            seed_fees(store, &id, PaymentStatus::Paid);
        }
        current = service
            .submit_stage_review(*stage, &id, submission(*status), actor)
            .expect("workflow step succeeds");
    }
    assert_eq!(current.status, target, "fixture path reaches target");
    current
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    notices: Mutex<Vec<TransitionNotice>>,
}

impl RecordingNotifier {
    pub(super) fn notices(&self) -> Vec<TransitionNotice> {
        self.notices.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: TransitionNotice) -> Result<(), NotifyError> {
        self.notices
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, _notice: TransitionNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay offline".to_string()))
    }
}

pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(
        &self,
        _record: ApplicationRecord,
        _expected_version: u64,
    ) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(
        &self,
        _status: Option<PermitStatus>,
        _limit: usize,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) fn router_with_service(service: TestService) -> axum::Router {
    review_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
