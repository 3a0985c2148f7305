use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use super::common::*;
use crate::workflows::error::ConflictError;
use crate::workflows::fees::{
    FeeCalculator, FeePaymentRecord, FeeQuery, FeeSchedule, PaymentEntry, PaymentSource,
    PaymentStatus,
};
use crate::workflows::review::ApplicationId;

fn invoice() -> FeePaymentRecord {
    let calculation = standard_calculator()
        .calculate(&FeeQuery::new("Mining", "Level 2"))
        .calculation()
        .cloned()
        .expect("scheduled");
    FeePaymentRecord::from_calculation(
        ApplicationId("PRM-000001".to_string()),
        "INV-2026-000001".to_string(),
        "PGK",
        &calculation,
        Utc::now(),
    )
}

fn manual(amount: Decimal) -> PaymentEntry {
    PaymentEntry {
        amount,
        reference: "RCPT-1".to_string(),
        source: PaymentSource::Manual,
        session_id: None,
        receipt_url: None,
        recorded_by: Some("rev-1".to_string()),
        recorded_at: Utc::now(),
    }
}

#[test]
fn new_invoice_is_pending_with_full_balance() {
    let record = invoice();
    assert_eq!(record.total_fee, money(2000));
    assert_eq!(record.amount_paid, Decimal::ZERO);
    assert_eq!(record.payment_status, PaymentStatus::Pending);
    assert_eq!(record.outstanding_balance(), money(2000));
    assert!(!record.allows_assessment());
}

#[test]
fn partial_then_full_payment_settles_without_drift() {
    let mut record = invoice();
    let first = Decimal::new(73333, 2);
    let second = Decimal::new(126667, 2);

    record.apply_payment(manual(first)).expect("partial payment");
    assert_eq!(record.payment_status, PaymentStatus::Partial);
    assert_eq!(record.amount_paid, first);
    assert_eq!(record.outstanding_balance(), record.total_fee - first);
    assert!(!record.allows_assessment());

    record.apply_payment(manual(second)).expect("final payment");
    assert_eq!(record.amount_paid, money(2000));
    assert_eq!(record.outstanding_balance(), Decimal::ZERO);
    assert_eq!(record.payment_status, PaymentStatus::Paid);
    assert!(record.allows_assessment());
    assert_eq!(record.payments.len(), 2);
}

#[test]
fn overpayment_is_rejected_without_mutation() {
    let mut record = invoice();
    record.apply_payment(manual(money(1500))).expect("partial");
    let before = record.clone();

    let err = record
        .apply_payment(manual(money(600)))
        .expect_err("exceeds outstanding 500");
    assert_eq!(
        err,
        ConflictError::Overpayment {
            attempted: money(600),
            outstanding: money(500),
        }
    );
    assert_eq!(record, before);
}

#[test]
fn waiver_settles_and_blocks_further_payments() {
    let mut record = invoice();
    record
        .waive("Community project exemption".to_string(), Utc::now())
        .expect("waivable");
    assert_eq!(record.payment_status, PaymentStatus::Waived);
    assert_eq!(record.outstanding_balance(), Decimal::ZERO);
    assert!(record.allows_assessment());

    assert_eq!(
        record.apply_payment(manual(money(10))),
        Err(ConflictError::FeesWaived)
    );
    assert_eq!(
        record.waive("again".to_string(), Utc::now()),
        Err(ConflictError::FeesWaived)
    );
}

#[test]
fn paid_invoices_cannot_be_waived() {
    let mut record = invoice();
    record.apply_payment(manual(money(2000))).expect("paid");
    assert_eq!(
        record.waive("late request".to_string(), Utc::now()),
        Err(ConflictError::AlreadySettled)
    );
}

#[test]
fn session_payments_are_detected() {
    let mut record = invoice();
    let mut entry = manual(money(100));
    entry.source = PaymentSource::Gateway;
    entry.session_id = Some("cs_test_1".to_string());
    record.apply_payment(entry).expect("gateway payment");

    assert!(record.has_session_payment("cs_test_1"));
    assert!(!record.has_session_payment("cs_test_2"));
}

#[test]
fn zero_fee_invoice_is_settled_on_creation() {
    let schedule = FeeSchedule::new(vec![entry("Research", "Science", "Level 1", 0, 0)])
        .expect("zero fees are valid");
    let calculation = FeeCalculator::new(Arc::new(schedule))
        .calculate(&FeeQuery::new("Research", "Level 1"))
        .calculation()
        .cloned()
        .expect("scheduled");
    let record = FeePaymentRecord::from_calculation(
        ApplicationId("PRM-000002".to_string()),
        "INV-2026-000002".to_string(),
        "PGK",
        &calculation,
        Utc::now(),
    );

    assert_eq!(record.total_fee, Decimal::ZERO);
    assert_eq!(record.payment_status, PaymentStatus::Paid);
    assert_eq!(record.outstanding_balance(), Decimal::ZERO);
    assert!(record.allows_assessment());
    assert_eq!(
        record.clone().waive("nothing owed".to_string(), Utc::now()),
        Err(ConflictError::AlreadySettled)
    );
}
