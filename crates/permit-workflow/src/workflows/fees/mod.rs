//! Fee calculation from the official schedule, and invoice/payment tracking that gates
//! assessment work until the invoice is settled.

pub mod calculator;
pub mod invoice;
pub mod payment;
pub mod repository;
pub mod router;
pub mod schedule;
pub mod tracker;
pub mod webhook;

#[cfg(test)]
mod tests;

pub use calculator::{
    FeeCalculation, FeeCalculator, FeeOutcome, FeeQuery, FeeSource, NotCalculableReason,
};
pub use invoice::{InvoiceDocument, InvoiceRenderer, PlainTextInvoiceRenderer, RenderError};
pub use payment::{FeePaymentRecord, PaymentEntry, PaymentSource, PaymentStatus};
pub use repository::{
    CheckoutMetadata, CheckoutRequest, CheckoutSession, FeeRepository, GatewayCallback,
    GatewayError, GatewayPaymentStatus, LineItem, PaymentGateway,
};
pub use router::fee_router;
pub use schedule::{FeeSchedule, FeeScheduleEntry, FeeScheduleImportError};
pub use tracker::{
    CallbackOutcome, CheckoutSettings, PaymentRequest, PaymentTracker, WaiverRequest,
    DEFAULT_CANCEL_URL, DEFAULT_CURRENCY, DEFAULT_SUCCESS_URL, DEFAULT_WEBHOOK_SECRET,
};
pub use webhook::{SignatureError, WebhookSecret, SIGNATURE_HEADER};
