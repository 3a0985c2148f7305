use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::calculator::{FeeCalculator, FeeOutcome, FeeQuery};
use super::invoice::{InvoiceDocument, InvoiceRenderer, PlainTextInvoiceRenderer};
use super::payment::{FeePaymentRecord, PaymentEntry, PaymentSource, PaymentStatus};
use super::repository::{
    CheckoutMetadata, CheckoutRequest, CheckoutSession, FeeRepository, GatewayCallback,
    GatewayError, GatewayPaymentStatus, LineItem, PaymentGateway,
};
use super::webhook::{SignatureError, WebhookSecret};
use crate::workflows::error::{
    ConflictError, RepositoryError, UpstreamError, ValidationError, WorkflowError,
};
use crate::workflows::observe;
use crate::workflows::review::domain::require;
use crate::workflows::review::{ActingUser, ApplicationId, ApplicationRecord, ApplicationRepository};

pub const DEFAULT_CURRENCY: &str = "PGK";
pub const DEFAULT_SUCCESS_URL: &str = "http://localhost:3000/payments/success";
pub const DEFAULT_CANCEL_URL: &str = "http://localhost:3000/payments/cancelled";
/// Only accepted outside production.
pub const DEFAULT_WEBHOOK_SECRET: &str = "development-webhook-secret";

/// Where the gateway sends the payer back to, the invoice currency, and the callback secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSettings {
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub webhook_secret: WebhookSecret,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            currency: DEFAULT_CURRENCY.to_string(),
            success_url: DEFAULT_SUCCESS_URL.to_string(),
            cancel_url: DEFAULT_CANCEL_URL.to_string(),
            webhook_secret: WebhookSecret::new(DEFAULT_WEBHOOK_SECRET),
        }
    }
}

/// Manual receipt keyed in by revenue or finance staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub reference: String,
    #[serde(default)]
    pub receipt_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaiverRequest {
    pub reason: String,
}

/// What a gateway callback did to the fee record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Applied(FeePaymentRecord),
    /// The session was already credited; nothing changed.
    Duplicate(FeePaymentRecord),
    /// The gateway reported a non-paid status; nothing changed.
    Ignored(FeePaymentRecord),
}

impl CallbackOutcome {
    pub const fn label(&self) -> &'static str {
        match self {
            CallbackOutcome::Applied(_) => "applied",
            CallbackOutcome::Duplicate(_) => "duplicate",
            CallbackOutcome::Ignored(_) => "ignored",
        }
    }

    pub fn record(&self) -> &FeePaymentRecord {
        match self {
            CallbackOutcome::Applied(record)
            | CallbackOutcome::Duplicate(record)
            | CallbackOutcome::Ignored(record) => record,
        }
    }
}

static INVOICE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_invoice_number(at: DateTime<Utc>) -> String {
    let sequence = INVOICE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("INV-{}-{sequence:06}", at.year())
}

/// Fee assessment, payments, and the gateway round trip for each application's invoice.
pub struct PaymentTracker<A, F, G> {
    applications: Arc<A>,
    fees: Arc<F>,
    gateway: Arc<G>,
    calculator: FeeCalculator,
    settings: CheckoutSettings,
    renderer: Arc<dyn InvoiceRenderer>,
}

impl<A, F, G> PaymentTracker<A, F, G>
where
    A: ApplicationRepository + 'static,
    F: FeeRepository + 'static,
    G: PaymentGateway + 'static,
{
    pub fn new(
        applications: Arc<A>,
        fees: Arc<F>,
        gateway: Arc<G>,
        calculator: FeeCalculator,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            applications,
            fees,
            gateway,
            calculator,
            settings,
            renderer: Arc::new(PlainTextInvoiceRenderer),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn InvoiceRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn calculator(&self) -> &FeeCalculator {
        &self.calculator
    }

    pub fn quote(&self, query: &FeeQuery) -> FeeOutcome {
        let outcome = self.calculator.calculate(query);
        debug!(
            activity = %query.activity_type,
            level = %query.permit_level,
            source = outcome.calculation().map(|calc| calc.source.label()).unwrap_or("none"),
            "fee quote"
        );
        outcome
    }

    /// Create the application's invoice. Returns the existing record when one was already made.
    pub fn assess_fees(
        &self,
        id: &ApplicationId,
        actor: &ActingUser,
    ) -> Result<FeePaymentRecord, WorkflowError> {
        observe("assess_fees", &id.0, self.create_invoice(id, actor))
    }

    fn create_invoice(
        &self,
        id: &ApplicationId,
        actor: &ActingUser,
    ) -> Result<FeePaymentRecord, WorkflowError> {
        let application = self.load_application(id)?;
        authorize_applicant_or_staff(actor, &application)?;
        if let Some(existing) = self.fees.fetch(id)? {
            return Ok(existing);
        }

        let query = FeeQuery {
            activity_type: application.activity_type.clone(),
            permit_level: application.permit_level.clone(),
            activity_category: application.activity_category.clone(),
        };
        let calculation = match self.calculator.calculate(&query) {
            FeeOutcome::Calculated(calculation) => calculation,
            FeeOutcome::NotCalculable { reason } => {
                return Err(WorkflowError::not_found(
                    "fee schedule entry",
                    format!(
                        "{} / {} ({})",
                        query.activity_type,
                        query.permit_level,
                        reason.describe()
                    ),
                ))
            }
        };

        let now = Utc::now();
        let record = FeePaymentRecord::from_calculation(
            id.clone(),
            next_invoice_number(now),
            &self.settings.currency,
            &calculation,
            now,
        );
        let stored = match self.fees.insert(record) {
            Ok(stored) => stored,
            Err(RepositoryError::Conflict) => {
                return self
                    .fees
                    .fetch(id)?
                    .ok_or_else(|| WorkflowError::not_found("fee record", id.0.clone()))
            }
            Err(err) => return Err(err.into()),
        };
        info!(
            application_id = %id,
            invoice = %stored.invoice_number,
            total = %stored.total_fee,
            estimated = stored.is_estimated,
            "fees assessed"
        );
        Ok(stored)
    }

    pub fn fees(&self, id: &ApplicationId) -> Result<FeePaymentRecord, WorkflowError> {
        observe("get_fees", &id.0, self.load_fees(id))
    }

    /// The fee record as seen by the applicant who owns it or by staff.
    pub fn fees_for(
        &self,
        id: &ApplicationId,
        actor: &ActingUser,
    ) -> Result<FeePaymentRecord, WorkflowError> {
        observe(
            "view_fees",
            &id.0,
            self.load_application(id).and_then(|application| {
                authorize_applicant_or_staff(actor, &application)?;
                self.load_fees(id)
            }),
        )
    }

    /// True once the invoice is paid or waived.
    pub fn allows_assessment(&self, id: &ApplicationId) -> Result<bool, WorkflowError> {
        observe(
            "allows_assessment",
            &id.0,
            self.load_fees(id).map(|record| record.allows_assessment()),
        )
    }

    pub fn record_payment(
        &self,
        id: &ApplicationId,
        request: PaymentRequest,
        actor: &ActingUser,
    ) -> Result<FeePaymentRecord, WorkflowError> {
        observe("record_payment", &id.0, self.credit_manual(id, request, actor))
    }

    fn credit_manual(
        &self,
        id: &ApplicationId,
        request: PaymentRequest,
        actor: &ActingUser,
    ) -> Result<FeePaymentRecord, WorkflowError> {
        if request.amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(request.amount).into());
        }
        require("reference", &request.reference)?;
        actor.authorize_fee_management()?;

        let mut record = self.load_fees(id)?;
        let amount = request.amount;
        record.apply_payment(PaymentEntry {
            amount,
            reference: request.reference.trim().to_string(),
            source: PaymentSource::Manual,
            session_id: None,
            receipt_url: request.receipt_url,
            recorded_by: Some(actor.user_id.clone()),
            recorded_at: Utc::now(),
        })?;

        let expected = record.version;
        let stored = self.fees.update(record, expected)?;
        info!(
            application_id = %id,
            %amount,
            paid = %stored.amount_paid,
            outstanding = %stored.outstanding_balance(),
            status = stored.payment_status.label(),
            "payment recorded"
        );
        Ok(stored)
    }

    /// Apply the gateway's payment notification. Replays of a credited session change nothing.
    pub fn apply_gateway_callback(
        &self,
        callback: GatewayCallback,
    ) -> Result<CallbackOutcome, WorkflowError> {
        let session = callback.session_id.clone();
        observe("gateway_callback", &session, self.credit_gateway(callback))
    }

    /// Verify the gateway's signature over the raw body before applying it.
    pub fn apply_signed_callback(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<CallbackOutcome, WorkflowError> {
        let callback = observe(
            "verify_callback",
            "gateway",
            self.verify_callback(signature, body),
        )?;
        self.apply_gateway_callback(callback)
    }

    fn verify_callback(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<GatewayCallback, WorkflowError> {
        let verified = match signature {
            Some(signature) => self.settings.webhook_secret.verify(signature, body),
            None => Err(SignatureError::Missing),
        };
        if let Err(err) = verified {
            warn!(error = %err, signed = signature.is_some(), "gateway callback rejected");
            return Err(WorkflowError::permission_denied(
                "payment-gateway",
                "deliver an unsigned or mis-signed callback",
            ));
        }
        serde_json::from_slice(body)
            .map_err(|err| ValidationError::MalformedBody(err.to_string()).into())
    }

    fn credit_gateway(&self, callback: GatewayCallback) -> Result<CallbackOutcome, WorkflowError> {
        require("session_id", &callback.session_id)?;
        let mut record = self
            .fees
            .find_by_checkout_session(&callback.session_id)?
            .ok_or_else(|| WorkflowError::not_found("checkout session", callback.session_id.clone()))?;

        if record.has_session_payment(&callback.session_id) {
            info!(
                application_id = %record.application_id,
                session = %callback.session_id,
                "duplicate gateway callback ignored"
            );
            return Ok(CallbackOutcome::Duplicate(record));
        }
        if callback.payment_status != GatewayPaymentStatus::Paid {
            info!(
                application_id = %record.application_id,
                session = %callback.session_id,
                status = ?callback.payment_status,
                "gateway callback without payment"
            );
            return Ok(CallbackOutcome::Ignored(record));
        }
        if callback.amount_paid <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(callback.amount_paid).into());
        }

        record.apply_payment(PaymentEntry {
            amount: callback.amount_paid,
            reference: callback.session_id.clone(),
            source: PaymentSource::Gateway,
            session_id: Some(callback.session_id.clone()),
            receipt_url: callback.receipt_url,
            recorded_by: None,
            recorded_at: Utc::now(),
        })?;

        let expected = record.version;
        let stored = self.fees.update(record, expected)?;
        info!(
            application_id = %stored.application_id,
            session = %callback.session_id,
            amount = %callback.amount_paid,
            status = stored.payment_status.label(),
            "gateway payment applied"
        );
        Ok(CallbackOutcome::Applied(stored))
    }

    /// Open a hosted checkout for the outstanding balance and return where to send the payer.
    pub fn start_checkout(
        &self,
        id: &ApplicationId,
        actor: &ActingUser,
    ) -> Result<CheckoutSession, WorkflowError> {
        observe("start_checkout", &id.0, self.open_checkout(id, actor))
    }

    fn open_checkout(
        &self,
        id: &ApplicationId,
        actor: &ActingUser,
    ) -> Result<CheckoutSession, WorkflowError> {
        let application = self.load_application(id)?;
        authorize_applicant_or_staff(actor, &application)?;

        let mut record = self.load_fees(id)?;
        if record.payment_status == PaymentStatus::Waived {
            return Err(ConflictError::FeesWaived.into());
        }
        let outstanding = record.outstanding_balance();
        if outstanding <= Decimal::ZERO {
            return Err(ConflictError::NothingOutstanding.into());
        }

        let request = CheckoutRequest {
            currency: record.currency.clone(),
            line_items: checkout_items(&record, &application, outstanding),
            success_url: self.settings.success_url.clone(),
            cancel_url: self.settings.cancel_url.clone(),
            metadata: CheckoutMetadata {
                invoice_id: id.0.clone(),
                invoice_number: record.invoice_number.clone(),
            },
        };
        let session = self.gateway.create_checkout(request).map_err(gateway_error)?;

        record.open_checkout(session.session_id.clone(), Utc::now());
        let expected = record.version;
        self.fees.update(record, expected)?;
        info!(
            application_id = %id,
            session = %session.session_id,
            amount = %outstanding,
            "checkout opened"
        );
        Ok(session)
    }

    pub fn waive_fees(
        &self,
        id: &ApplicationId,
        request: WaiverRequest,
        actor: &ActingUser,
    ) -> Result<FeePaymentRecord, WorkflowError> {
        observe("waive_fees", &id.0, self.apply_waiver(id, request, actor))
    }

    fn apply_waiver(
        &self,
        id: &ApplicationId,
        request: WaiverRequest,
        actor: &ActingUser,
    ) -> Result<FeePaymentRecord, WorkflowError> {
        require("reason", &request.reason)?;
        actor.authorize_fee_management()?;

        let mut record = self.load_fees(id)?;
        record.waive(request.reason.trim().to_string(), Utc::now())?;
        let expected = record.version;
        let stored = self.fees.update(record, expected)?;
        info!(application_id = %id, by = %actor.user_id, "fees waived");
        Ok(stored)
    }

    pub fn render_invoice(
        &self,
        id: &ApplicationId,
        actor: &ActingUser,
    ) -> Result<InvoiceDocument, WorkflowError> {
        observe("render_invoice", &id.0, self.build_invoice(id, actor))
    }

    fn build_invoice(
        &self,
        id: &ApplicationId,
        actor: &ActingUser,
    ) -> Result<InvoiceDocument, WorkflowError> {
        let application = self.load_application(id)?;
        authorize_applicant_or_staff(actor, &application)?;
        let fees = self.load_fees(id)?;
        let bytes = self
            .renderer
            .render(&fees, &application)
            .map_err(|err| UpstreamError::Renderer(err.to_string()))?;
        Ok(InvoiceDocument {
            file_name: format!(
                "{}.{}",
                fees.invoice_number,
                self.renderer.file_extension()
            ),
            content_type: self.renderer.content_type(),
            bytes,
        })
    }

    fn load_fees(&self, id: &ApplicationId) -> Result<FeePaymentRecord, WorkflowError> {
        self.fees
            .fetch(id)?
            .ok_or_else(|| WorkflowError::not_found("fee record", id.0.clone()))
    }

    fn load_application(&self, id: &ApplicationId) -> Result<ApplicationRecord, WorkflowError> {
        self.applications
            .fetch(id)?
            .ok_or_else(|| WorkflowError::not_found("application", id.0.clone()))
    }
}

fn authorize_applicant_or_staff(
    actor: &ActingUser,
    application: &ApplicationRecord,
) -> Result<(), WorkflowError> {
    actor.authorize_applicant_or_staff(
        &application.submitted_by,
        format!("handle fees for {}", application.id),
    )
}

/// Itemised fees on a fresh invoice; a single balance line once something has been paid.
fn checkout_items(
    record: &FeePaymentRecord,
    application: &ApplicationRecord,
    outstanding: Decimal,
) -> Vec<LineItem> {
    if record.amount_paid.is_zero() {
        vec![
            LineItem {
                description: format!(
                    "Administration fee: {} ({})",
                    application.activity_type, application.permit_level
                ),
                amount: record.administration_fee,
            },
            LineItem {
                description: format!(
                    "Technical fee: {} ({})",
                    application.activity_type, application.permit_level
                ),
                amount: record.technical_fee,
            },
        ]
        .into_iter()
        .filter(|item| item.amount > Decimal::ZERO)
        .collect()
    } else {
        vec![LineItem {
            description: format!("Outstanding balance for invoice {}", record.invoice_number),
            amount: outstanding,
        }]
    }
}

fn gateway_error(err: GatewayError) -> WorkflowError {
    warn!(error = %err, "payment gateway call failed");
    UpstreamError::Gateway(err.to_string()).into()
}

