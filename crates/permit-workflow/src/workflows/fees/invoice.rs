use std::fmt::Write;

use rust_decimal::Decimal;
use serde::Serialize;

use super::payment::{FeePaymentRecord, PaymentSource};
use crate::workflows::review::ApplicationRecord;

/// Document collaborator turning an invoice into downloadable bytes.
///
/// Implementations must be deterministic: the same records always produce the same bytes.
pub trait InvoiceRenderer: Send + Sync {
    fn content_type(&self) -> &'static str;
    fn file_extension(&self) -> &'static str;
    fn render(
        &self,
        fees: &FeePaymentRecord,
        application: &ApplicationRecord,
    ) -> Result<Vec<u8>, RenderError>;
}

#[derive(Debug, thiserror::Error)]
#[error("invoice rendering failed: {0}")]
pub struct RenderError(pub String);

impl From<std::fmt::Error> for RenderError {
    fn from(err: std::fmt::Error) -> Self {
        Self(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceDocument {
    pub file_name: String,
    pub content_type: &'static str,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Fixed-width plain text invoice.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextInvoiceRenderer;

const RULE: &str = "------------------------------------------------------------";

impl InvoiceRenderer for PlainTextInvoiceRenderer {
    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "txt"
    }

    fn render(
        &self,
        fees: &FeePaymentRecord,
        application: &ApplicationRecord,
    ) -> Result<Vec<u8>, RenderError> {
        let mut out = String::new();
        writeln!(out, "INVOICE {}", fees.invoice_number)?;
        writeln!(out, "Issued: {}", fees.created_at.format("%Y-%m-%d"))?;
        writeln!(out, "Application: {}", application.id)?;
        writeln!(out, "Applicant: {}", application.applicant_name)?;
        writeln!(out, "Entity: {}", application.entity_reference)?;
        writeln!(
            out,
            "Activity: {} ({})",
            application.activity_type, application.permit_level
        )?;
        writeln!(out, "{RULE}")?;
        line(
            &mut out,
            &format!("Administration fee [{}]", fees.administration_form),
            fees.administration_fee,
            &fees.currency,
        )?;
        line(
            &mut out,
            &format!("Technical fee [{}]", fees.technical_form),
            fees.technical_fee,
            &fees.currency,
        )?;
        writeln!(out, "{RULE}")?;
        line(&mut out, "Total", fees.total_fee, &fees.currency)?;
        line(&mut out, "Paid", fees.amount_paid, &fees.currency)?;
        line(
            &mut out,
            "Outstanding",
            fees.outstanding_balance(),
            &fees.currency,
        )?;
        writeln!(out, "Status: {}", fees.payment_status.label())?;
        writeln!(out, "Processing time: {} days", fees.processing_days)?;

        if !fees.payments.is_empty() {
            writeln!(out, "{RULE}")?;
            writeln!(out, "Payments")?;
            for entry in &fees.payments {
                let source = match entry.source {
                    PaymentSource::Manual => "manual",
                    PaymentSource::Gateway => "online",
                };
                writeln!(
                    out,
                    "  {} {:>12} {} {} ({source})",
                    entry.recorded_at.format("%Y-%m-%d"),
                    money(entry.amount),
                    fees.currency,
                    entry.reference,
                )?;
            }
        }
        if let Some(reason) = &fees.waiver_reason {
            writeln!(out, "Fees waived: {reason}")?;
        }
        if fees.is_estimated {
            writeln!(out, "{RULE}")?;
            writeln!(
                out,
                "NOTE: fees are estimated and may change upon official processing."
            )?;
        }
        Ok(out.into_bytes())
    }
}

fn line(out: &mut String, label: &str, amount: Decimal, currency: &str) -> std::fmt::Result {
    writeln!(out, "{label:<40}{:>14} {currency}", money(amount))
}

fn money(amount: Decimal) -> String {
    format!("{:.2}", amount)
}
