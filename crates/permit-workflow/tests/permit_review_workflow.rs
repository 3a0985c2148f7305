use std::io::Cursor;
use std::sync::{Arc, Mutex};

use permit_workflow::workflows::fees::{
    CheckoutRequest, CheckoutSession, CheckoutSettings, FeeCalculator, FeeOutcome, FeeQuery,
    FeeSchedule, FeeSource, GatewayCallback, GatewayError, GatewayPaymentStatus, PaymentGateway,
    PaymentRequest, PaymentStatus, PaymentTracker,
};
use permit_workflow::workflows::memory::InMemoryPermitStore;
use permit_workflow::workflows::review::{
    ActingUser, ApplicationDraft, ApplicationKind, ApplicationRecord, DirectorateDecision,
    DirectorateRequest, DirectorateStatus, Notifier, NotifyError, PermitStatus, ReviewStage,
    ReviewWorkflowService, StaffPosition, StaffUnit, StageSubmission, TransitionNotice,
};
use permit_workflow::workflows::{ConflictError, WorkflowError};
use rust_decimal::Decimal;

#[derive(Default)]
struct CollectingNotifier {
    notices: Mutex<Vec<TransitionNotice>>,
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notice: TransitionNotice) -> Result<(), NotifyError> {
        self.notices
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice);
        Ok(())
    }
}

struct StaticGateway;

impl PaymentGateway for StaticGateway {
    fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let session_id = format!("cs_{}", request.metadata.invoice_id);
        Ok(CheckoutSession {
            redirect_url: format!("https://gateway.test/{session_id}"),
            session_id,
        })
    }
}

struct Harness {
    store: Arc<InMemoryPermitStore>,
    notifier: Arc<CollectingNotifier>,
    reviews: ReviewWorkflowService<InMemoryPermitStore, InMemoryPermitStore, CollectingNotifier>,
    payments: PaymentTracker<InMemoryPermitStore, InMemoryPermitStore, StaticGateway>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryPermitStore::new());
    let notifier = Arc::new(CollectingNotifier::default());
    let calculator = FeeCalculator::new(Arc::new(FeeSchedule::standard()));
    Harness {
        reviews: ReviewWorkflowService::new(store.clone(), store.clone(), notifier.clone()),
        payments: PaymentTracker::new(
            store.clone(),
            store.clone(),
            Arc::new(StaticGateway),
            calculator,
            CheckoutSettings::default(),
        ),
        store,
        notifier,
    }
}

fn applicant() -> ActingUser {
    ActingUser::public("applicant-7").with_display_name("Ruth Wari")
}

fn registry() -> ActingUser {
    ActingUser::staff("reg-7", Some(StaffUnit::Registry), Some(StaffPosition::Officer))
}

fn compliance() -> ActingUser {
    ActingUser::staff("comp-7", Some(StaffUnit::Compliance), Some(StaffPosition::Officer))
}

fn revenue() -> ActingUser {
    ActingUser::staff("rev-7", Some(StaffUnit::Revenue), Some(StaffPosition::Officer))
}

fn managing_director() -> ActingUser {
    ActingUser::staff("md-7", None, Some(StaffPosition::ManagingDirector))
}

fn directorate() -> ActingUser {
    ActingUser::staff("dir-7", Some(StaffUnit::Directorate), Some(StaffPosition::Director))
}

fn mining_draft() -> ApplicationDraft {
    ApplicationDraft {
        kind: ApplicationKind::Permit,
        entity_reference: "ENT-9001".to_string(),
        applicant_name: "Ramu Valley Minerals".to_string(),
        activity_type: "Mining".to_string(),
        permit_level: "Level 2".to_string(),
        activity_category: Some("Extractive".to_string()),
        documents: Vec::new(),
    }
}

fn review(target: PermitStatus) -> StageSubmission {
    StageSubmission {
        assessment: "ok".to_string(),
        remarks: None,
        proposed_action: "approve".to_string(),
        target_status: target,
        documents: Vec::new(),
        expected_version: None,
    }
}

fn registry_approved(harness: &Harness) -> ApplicationRecord {
    let submitted = harness
        .reviews
        .submit(mining_draft(), &applicant())
        .expect("application submitted");
    harness
        .reviews
        .submit_stage_review(
            ReviewStage::Registry,
            &submitted.id,
            review(PermitStatus::UnderReview),
            &registry(),
        )
        .expect("registry picks up");
    harness
        .reviews
        .submit_stage_review(
            ReviewStage::Registry,
            &submitted.id,
            review(PermitStatus::RegistryApproved),
            &registry(),
        )
        .expect("registry approves")
}

#[test]
fn official_schedule_prices_mining_level_two() {
    let harness = harness();
    let outcome = harness.payments.quote(&FeeQuery::new("Mining", "Level 2"));
    let calculation = outcome.calculation().expect("scheduled");
    assert_eq!(calculation.total_fee, Decimal::from(2000));
    assert_eq!(calculation.source, FeeSource::Official);
}

#[test]
fn unknown_activity_is_estimated_from_the_level() {
    let harness = harness();
    match harness
        .payments
        .quote(&FeeQuery::new("Unknown Activity", "Level 1"))
    {
        FeeOutcome::Calculated(calculation) => {
            assert!(calculation.is_estimated);
            assert_eq!(calculation.source, FeeSource::Estimated);
            assert!(calculation.total_fee > Decimal::ZERO);
        }
        other => panic!("expected an estimate, got {other:?}"),
    }
}

#[test]
fn registry_approval_is_reserved_to_registry_staff() {
    let harness = harness();
    let submitted = harness
        .reviews
        .submit(mining_draft(), &applicant())
        .expect("application submitted");
    harness
        .reviews
        .submit_stage_review(
            ReviewStage::Registry,
            &submitted.id,
            review(PermitStatus::UnderReview),
            &registry(),
        )
        .expect("registry picks up");

    let err = harness
        .reviews
        .submit_stage_review(
            ReviewStage::Registry,
            &submitted.id,
            review(PermitStatus::RegistryApproved),
            &compliance(),
        )
        .expect_err("compliance cannot act for registry");
    assert!(matches!(err, WorkflowError::PermissionDenied { .. }));
    assert_eq!(
        harness.reviews.get(&submitted.id).expect("stored").status,
        PermitStatus::UnderReview
    );

    let approved = harness
        .reviews
        .submit_stage_review(
            ReviewStage::Registry,
            &submitted.id,
            review(PermitStatus::RegistryApproved),
            &registry(),
        )
        .expect("registry approves");
    assert_eq!(approved.status, PermitStatus::RegistryApproved);
    let registry_review = approved
        .reviews
        .get(ReviewStage::Registry)
        .expect("registry review stored");
    assert_eq!(registry_review.assessment, "ok");
    assert_eq!(registry_review.proposed_action, "approve");
}

#[test]
fn compliance_review_waits_for_full_payment() {
    let harness = harness();
    let application = registry_approved(&harness);
    let invoice = harness
        .payments
        .assess_fees(&application.id, &applicant())
        .expect("fees assessed");
    assert_eq!(invoice.total_fee, Decimal::from(2000));
    assert_eq!(invoice.amount_paid, Decimal::ZERO);

    let blocked = harness
        .reviews
        .submit_stage_review(
            ReviewStage::Compliance,
            &application.id,
            review(PermitStatus::ComplianceReview),
            &compliance(),
        )
        .expect_err("gate closed while unpaid");
    assert!(matches!(
        blocked,
        WorkflowError::Conflict(ConflictError::PaymentOutstanding { .. })
    ));

    let paid = harness
        .payments
        .record_payment(
            &application.id,
            PaymentRequest {
                amount: Decimal::from(2000),
                reference: "BSP-2026-0042".to_string(),
                receipt_url: None,
            },
            &revenue(),
        )
        .expect("payment recorded");
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.outstanding_balance(), Decimal::ZERO);

    let opened = harness
        .reviews
        .submit_stage_review(
            ReviewStage::Compliance,
            &application.id,
            review(PermitStatus::ComplianceReview),
            &compliance(),
        )
        .expect("gate open after payment");
    assert_eq!(opened.status, PermitStatus::ComplianceReview);
}

#[test]
fn gateway_payment_carries_an_application_to_a_signed_letter() {
    let harness = harness();
    let application = registry_approved(&harness);
    let id = application.id.clone();
    harness
        .payments
        .assess_fees(&id, &applicant())
        .expect("fees assessed");
    let session = harness
        .payments
        .start_checkout(&id, &applicant())
        .expect("checkout opened");

    let callback = GatewayCallback {
        session_id: session.session_id.clone(),
        payment_status: GatewayPaymentStatus::Paid,
        amount_paid: Decimal::from(2000),
        receipt_url: Some("https://gateway.test/receipt/1".to_string()),
    };
    harness
        .payments
        .apply_gateway_callback(callback.clone())
        .expect("callback applied");
    let replay = harness
        .payments
        .apply_gateway_callback(callback)
        .expect("replay tolerated");
    assert_eq!(replay.label(), "duplicate");
    assert_eq!(replay.record().amount_paid, Decimal::from(2000));

    for (stage, target, actor) in [
        (ReviewStage::Compliance, PermitStatus::ComplianceReview, compliance()),
        (ReviewStage::Compliance, PermitStatus::ComplianceApproved, compliance()),
        (ReviewStage::Compliance, PermitStatus::MdReview, compliance()),
        (ReviewStage::ManagingDirector, PermitStatus::Approved, managing_director()),
    ] {
        harness
            .reviews
            .submit_stage_review(stage, &id, review(target), &actor)
            .expect("workflow step succeeds");
    }

    harness
        .reviews
        .request_directorate_approval(&id, DirectorateRequest::default(), &managing_director())
        .expect("directorate requested");
    harness
        .reviews
        .decide_directorate(
            &id,
            DirectorateDecision {
                decision: DirectorateStatus::Approved,
                notes: Some("Conditions reviewed".to_string()),
            },
            &directorate(),
        )
        .expect("directorate approves");
    let signed = harness
        .reviews
        .sign_letter(&id, &managing_director())
        .expect("letter signed");

    assert_eq!(signed.status, PermitStatus::Approved);
    let approval = signed.directorate.expect("directorate approval present");
    assert_eq!(approval.approval_status, DirectorateStatus::Approved);
    assert!(approval.letter_signed);
    assert!(approval.signed_at.is_some());

    let history: Vec<_> = signed.history.iter().map(|change| change.to).collect();
    assert_eq!(
        history,
        vec![
            PermitStatus::Submitted,
            PermitStatus::UnderReview,
            PermitStatus::RegistryApproved,
            PermitStatus::ComplianceReview,
            PermitStatus::ComplianceApproved,
            PermitStatus::MdReview,
            PermitStatus::Approved,
        ]
    );
    assert!(
        harness
            .notifier
            .notices
            .lock()
            .expect("notifier mutex poisoned")
            .len()
            >= 9
    );
    assert_eq!(harness.store.application_count(), 1);
}

#[test]
fn imported_schedule_drives_quotes() {
    let csv = "\
activity_type,activity_category,permit_level,administration_fee,technical_fee,administration_form,technical_form,processing_days
Aquaculture,Agriculture,Level 2,250.00,750.00,ENV-ADM-02,ENV-TEC-AQ2,45
Logging,Agriculture,Level 2,400.00,1100.00,ENV-ADM-02,ENV-TEC-LG2,60
";
    let schedule = FeeSchedule::from_reader(Cursor::new(csv)).expect("schedule imports");
    let calculator = FeeCalculator::new(Arc::new(schedule));

    let official = calculator.calculate(&FeeQuery::new("aquaculture", "level 2"));
    assert_eq!(
        official.calculation().map(|calc| calc.total_fee),
        Some(Decimal::from(1000))
    );

    let estimated = calculator
        .calculate(&FeeQuery::new("Oil Palm", "Level 2").with_category("Agriculture"))
        .calculation()
        .cloned()
        .expect("estimated from level 2 rows");
    assert!(estimated.is_estimated);
    assert_eq!(estimated.basis_activity, "Logging");
}
