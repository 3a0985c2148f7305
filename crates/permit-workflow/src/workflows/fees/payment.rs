use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::calculator::{FeeCalculation, FeeSource};
use crate::workflows::error::ConflictError;
use crate::workflows::review::ApplicationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
    Waived,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Paid => "paid",
            Self::Waived => "waived",
        }
    }

    /// Nothing owed counts as paid, including zero-fee invoices.
    fn for_amounts(amount_paid: Decimal, total_fee: Decimal) -> Self {
        if amount_paid >= total_fee {
            Self::Paid
        } else if amount_paid > Decimal::ZERO {
            Self::Partial
        } else {
            Self::Pending
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentSource {
    /// Receipt keyed in by revenue or finance staff.
    Manual,
    Gateway,
}

/// One accepted payment. Entries are appended and never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEntry {
    pub amount: Decimal,
    pub reference: String,
    pub source: PaymentSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_by: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Invoice and payment state for one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePaymentRecord {
    pub application_id: ApplicationId,
    pub invoice_number: String,
    pub currency: String,
    pub administration_fee: Decimal,
    pub technical_fee: Decimal,
    pub total_fee: Decimal,
    pub amount_paid: Decimal,
    pub payment_status: PaymentStatus,
    pub fee_source: FeeSource,
    #[serde(default)]
    pub is_estimated: bool,
    pub administration_form: String,
    pub technical_form: String,
    pub processing_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiver_reason: Option<String>,
    /// Checkout sessions opened with the payment gateway, oldest first.
    #[serde(default)]
    pub checkout_sessions: Vec<String>,
    #[serde(default)]
    pub payments: Vec<PaymentEntry>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeePaymentRecord {
    pub fn from_calculation(
        application_id: ApplicationId,
        invoice_number: String,
        currency: &str,
        calculation: &FeeCalculation,
        at: DateTime<Utc>,
    ) -> Self {
        let total_fee = calculation.administration_fee + calculation.technical_fee;
        Self {
            application_id,
            invoice_number,
            currency: currency.to_string(),
            administration_fee: calculation.administration_fee,
            technical_fee: calculation.technical_fee,
            total_fee,
            amount_paid: Decimal::ZERO,
            payment_status: PaymentStatus::for_amounts(Decimal::ZERO, total_fee),
            fee_source: calculation.source,
            is_estimated: calculation.is_estimated,
            administration_form: calculation.administration_form.clone(),
            technical_form: calculation.technical_form.clone(),
            processing_days: calculation.processing_days,
            payment_reference: None,
            receipt_url: None,
            waiver_reason: None,
            checkout_sessions: Vec::new(),
            payments: Vec::new(),
            version: 0,
            created_at: at,
            updated_at: at,
        }
    }

    /// Amount still owed. Waived invoices owe nothing.
    pub fn outstanding_balance(&self) -> Decimal {
        match self.payment_status {
            PaymentStatus::Waived => Decimal::ZERO,
            _ => (self.total_fee - self.amount_paid).max(Decimal::ZERO),
        }
    }

    /// Assessment work may start only once the invoice is settled.
    pub fn allows_assessment(&self) -> bool {
        matches!(
            self.payment_status,
            PaymentStatus::Paid | PaymentStatus::Waived
        )
    }

    pub fn has_session_payment(&self, session_id: &str) -> bool {
        self.payments
            .iter()
            .any(|entry| entry.session_id.as_deref() == Some(session_id))
    }

    /// Apply an accepted payment. Rejected payments leave the record untouched.
    pub(crate) fn apply_payment(&mut self, entry: PaymentEntry) -> Result<(), ConflictError> {
        if self.payment_status == PaymentStatus::Waived {
            return Err(ConflictError::FeesWaived);
        }
        let outstanding = self.outstanding_balance();
        if entry.amount > outstanding {
            return Err(ConflictError::Overpayment {
                attempted: entry.amount,
                outstanding,
            });
        }

        self.amount_paid += entry.amount;
        self.payment_status = PaymentStatus::for_amounts(self.amount_paid, self.total_fee);
        self.payment_reference = Some(entry.reference.clone());
        if entry.receipt_url.is_some() {
            self.receipt_url = entry.receipt_url.clone();
        }
        self.updated_at = entry.recorded_at;
        self.payments.push(entry);
        Ok(())
    }

    pub(crate) fn waive(&mut self, reason: String, at: DateTime<Utc>) -> Result<(), ConflictError> {
        match self.payment_status {
            PaymentStatus::Waived => Err(ConflictError::FeesWaived),
            PaymentStatus::Paid => Err(ConflictError::AlreadySettled),
            PaymentStatus::Pending | PaymentStatus::Partial => {
                self.payment_status = PaymentStatus::Waived;
                self.waiver_reason = Some(reason);
                self.updated_at = at;
                Ok(())
            }
        }
    }

    pub(crate) fn open_checkout(&mut self, session_id: String, at: DateTime<Utc>) {
        self.checkout_sessions.push(session_id);
        self.updated_at = at;
    }
}
