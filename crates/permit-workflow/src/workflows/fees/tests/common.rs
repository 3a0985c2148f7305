use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::workflows::fees::{
    CheckoutRequest, CheckoutSession, CheckoutSettings, FeeCalculator, FeeSchedule,
    FeeScheduleEntry, GatewayCallback, GatewayError, GatewayPaymentStatus, PaymentGateway,
    PaymentTracker, WebhookSecret,
};
use crate::workflows::memory::InMemoryPermitStore;
use crate::workflows::review::{
    ActingUser, ApplicationDraft, ApplicationId, ApplicationKind, ApplicationRecord,
    ApplicationRepository, StaffUnit,
};

pub(super) type TestTracker = PaymentTracker<InMemoryPermitStore, InMemoryPermitStore, RecordingGateway>;

pub(super) fn money(value: i64) -> Decimal {
    Decimal::from(value)
}

pub(super) fn entry(activity: &str, category: &str, level: &str, admin: i64, technical: i64) -> FeeScheduleEntry {
    FeeScheduleEntry {
        activity_type: activity.to_string(),
        activity_category: category.to_string(),
        permit_level: level.to_string(),
        administration_fee: money(admin),
        technical_fee: money(technical),
        administration_form: format!("ADM-{level}"),
        technical_form: format!("TEC-{activity}"),
        processing_days: 30,
    }
}

pub(super) fn standard_calculator() -> FeeCalculator {
    FeeCalculator::new(Arc::new(FeeSchedule::standard()))
}

pub(super) const WEBHOOK_SECRET: &str = "whsec_permit_tests";

pub(super) fn settings() -> CheckoutSettings {
    CheckoutSettings {
        currency: "PGK".to_string(),
        success_url: "https://permits.example.gov/pay/success".to_string(),
        cancel_url: "https://permits.example.gov/pay/cancel".to_string(),
        webhook_secret: WebhookSecret::new(WEBHOOK_SECRET),
    }
}

/// Callback body and the signature the gateway would send with it.
pub(super) fn signed_body(callback: &GatewayCallback) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(callback).expect("encode callback");
    let signature = WebhookSecret::new(WEBHOOK_SECRET)
        .sign(&body)
        .expect("sign callback");
    (body, signature)
}

pub(super) fn build_tracker() -> (TestTracker, Arc<InMemoryPermitStore>, Arc<RecordingGateway>) {
    let store = Arc::new(InMemoryPermitStore::new());
    let gateway = Arc::new(RecordingGateway::default());
    let tracker = PaymentTracker::new(
        store.clone(),
        store.clone(),
        gateway.clone(),
        standard_calculator(),
        settings(),
    );
    (tracker, store, gateway)
}

pub(super) fn applicant() -> ActingUser {
    ActingUser::public("applicant-1")
}

pub(super) fn revenue_officer() -> ActingUser {
    ActingUser::staff("rev-1", Some(StaffUnit::Revenue), None)
}

pub(super) fn registry_officer() -> ActingUser {
    ActingUser::staff("reg-1", Some(StaffUnit::Registry), None)
}

pub(super) fn stored_application(
    store: &InMemoryPermitStore,
    suffix: u32,
    activity: &str,
    level: &str,
) -> ApplicationRecord {
    let draft = ApplicationDraft {
        kind: ApplicationKind::Permit,
        entity_reference: format!("ENT-{suffix}"),
        applicant_name: "Sepik Timber Co".to_string(),
        activity_type: activity.to_string(),
        permit_level: level.to_string(),
        activity_category: None,
        documents: Vec::new(),
    };
    let submitted_at = Utc
        .with_ymd_and_hms(2026, 3, 2, 9, 30, 0)
        .single()
        .expect("valid timestamp");
    let record = ApplicationRecord::from_draft(
        ApplicationId(format!("PRM-{suffix:06}")),
        draft,
        &applicant(),
        submitted_at,
    );
    ApplicationRepository::insert(store, record).expect("application stored")
}

pub(super) fn paid_callback(session_id: &str, amount: i64) -> GatewayCallback {
    GatewayCallback {
        session_id: session_id.to_string(),
        payment_status: GatewayPaymentStatus::Paid,
        amount_paid: money(amount),
        receipt_url: Some(format!("https://pay.example.com/receipts/{session_id}")),
    }
}

#[derive(Default)]
pub(super) struct RecordingGateway {
    sequence: AtomicU64,
    requests: Mutex<Vec<CheckoutRequest>>,
}

impl RecordingGateway {
    pub(super) fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().expect("gateway mutex poisoned").clone()
    }
}

impl PaymentGateway for RecordingGateway {
    fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.requests
            .lock()
            .expect("gateway mutex poisoned")
            .push(request);
        Ok(CheckoutSession {
            session_id: format!("cs_test_{id}"),
            redirect_url: format!("https://pay.example.com/checkout/cs_test_{id}"),
        })
    }
}

pub(super) struct OfflineGateway;

impl PaymentGateway for OfflineGateway {
    fn create_checkout(&self, _request: CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        Err(GatewayError::Unavailable("connection reset".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
