use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::payment::FeePaymentRecord;
use crate::workflows::error::RepositoryError;
use crate::workflows::review::ApplicationId;

/// Storage abstraction for fee payment records, one per application.
///
/// Versioning follows [`crate::workflows::review::ApplicationRepository`].
pub trait FeeRepository: Send + Sync {
    fn insert(&self, record: FeePaymentRecord) -> Result<FeePaymentRecord, RepositoryError>;
    fn update(
        &self,
        record: FeePaymentRecord,
        expected_version: u64,
    ) -> Result<FeePaymentRecord, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<FeePaymentRecord>, RepositoryError>;
    fn find_by_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<FeePaymentRecord>, RepositoryError>;
}

/// Hosted checkout provider.
pub trait PaymentGateway: Send + Sync {
    fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutMetadata {
    pub invoice_id: String,
    pub invoice_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub currency: String,
    pub line_items: Vec<LineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: CheckoutMetadata,
}

impl CheckoutRequest {
    pub fn total(&self) -> Decimal {
        self.line_items.iter().map(|item| item.amount).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayPaymentStatus {
    Paid,
    Unpaid,
    Expired,
    #[serde(other)]
    Other,
}

/// Payment notification delivered by the gateway after checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCallback {
    pub session_id: String,
    pub payment_status: GatewayPaymentStatus,
    pub amount_paid: Decimal,
    #[serde(default)]
    pub receipt_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway rejected the checkout: {0}")]
    Rejected(String),
    #[error("payment gateway unreachable: {0}")]
    Unavailable(String),
}
