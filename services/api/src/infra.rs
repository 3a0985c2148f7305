use metrics_exporter_prometheus::PrometheusHandle;
use permit_workflow::config::AppConfig;
use permit_workflow::error::AppError;
use permit_workflow::workflows::fees::{
    CheckoutRequest, CheckoutSession, FeeCalculator, GatewayError, PaymentGateway, PaymentTracker,
};
use permit_workflow::workflows::memory::InMemoryPermitStore;
use permit_workflow::workflows::review::{
    Notifier, NotifyError, ReviewWorkflowService, TransitionNotice,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) type ApiReviewService =
    ReviewWorkflowService<InMemoryPermitStore, InMemoryPermitStore, LoggingNotifier>;
pub(crate) type ApiPaymentTracker =
    PaymentTracker<InMemoryPermitStore, InMemoryPermitStore, SandboxCheckoutGateway>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Writes transition notices to the log until a mail relay is wired in.
#[derive(Debug, Default, Clone)]
pub(crate) struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn notify(&self, notice: TransitionNotice) -> Result<(), NotifyError> {
        info!(
            template = %notice.template,
            application_id = %notice.application_id,
            status = notice.status.label(),
            actor = %notice.actor,
            details = ?notice.details,
            "transition notice"
        );
        Ok(())
    }
}

/// Hands out hosted-checkout sessions under the configured base URL without charging anyone.
#[derive(Debug)]
pub(crate) struct SandboxCheckoutGateway {
    base_url: String,
    sequence: AtomicU64,
}

impl SandboxCheckoutGateway {
    pub(crate) fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sequence: AtomicU64::new(1),
        }
    }
}

impl PaymentGateway for SandboxCheckoutGateway {
    fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        if request.line_items.is_empty() {
            return Err(GatewayError::Rejected("checkout has no line items".to_string()));
        }
        let session_id = format!(
            "cs_sandbox_{:08}",
            self.sequence.fetch_add(1, Ordering::Relaxed)
        );
        info!(
            session = %session_id,
            invoice = %request.metadata.invoice_number,
            currency = %request.currency,
            total = %request.total(),
            "sandbox checkout created"
        );
        Ok(CheckoutSession {
            redirect_url: format!("{}/{}", self.base_url, session_id),
            session_id,
        })
    }
}

/// Workflow services sharing one in-memory store.
pub(crate) struct PermitServices {
    pub(crate) store: Arc<InMemoryPermitStore>,
    pub(crate) reviews: Arc<ApiReviewService>,
    pub(crate) payments: Arc<ApiPaymentTracker>,
}

pub(crate) fn build_services(config: &AppConfig) -> Result<PermitServices, AppError> {
    let schedule = config.fees.load_schedule()?;
    info!(
        entries = schedule.len(),
        source = config
            .fees
            .schedule_path
            .as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "standard".to_string()),
        "fee schedule loaded"
    );

    let store = Arc::new(InMemoryPermitStore::new());
    let reviews = Arc::new(ReviewWorkflowService::new(
        store.clone(),
        store.clone(),
        Arc::new(LoggingNotifier),
    ));
    let payments = Arc::new(PaymentTracker::new(
        store.clone(),
        store.clone(),
        Arc::new(SandboxCheckoutGateway::new(
            config.payments.checkout_base_url.clone(),
        )),
        FeeCalculator::new(Arc::new(schedule)),
        config.checkout_settings(),
    ));
    Ok(PermitServices {
        store,
        reviews,
        payments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use permit_workflow::workflows::fees::{CheckoutMetadata, LineItem};
    use rust_decimal::Decimal;

    fn request(line_items: Vec<LineItem>) -> CheckoutRequest {
        CheckoutRequest {
            currency: "PGK".to_string(),
            line_items,
            success_url: "http://localhost:3000/payments/success".to_string(),
            cancel_url: "http://localhost:3000/payments/cancelled".to_string(),
            metadata: CheckoutMetadata {
                invoice_id: "PRM-000001".to_string(),
                invoice_number: "INV-2026-000001".to_string(),
            },
        }
    }

    #[test]
    fn sandbox_gateway_issues_sequential_sessions_under_base_url() {
        let gateway = SandboxCheckoutGateway::new("https://checkout.sandbox.local/session/");
        let items = vec![LineItem {
            description: "Administration fee".to_string(),
            amount: Decimal::from(500),
        }];

        let first = gateway
            .create_checkout(request(items.clone()))
            .expect("session created");
        let second = gateway
            .create_checkout(request(items))
            .expect("session created");

        assert_eq!(first.session_id, "cs_sandbox_00000001");
        assert_eq!(
            first.redirect_url,
            "https://checkout.sandbox.local/session/cs_sandbox_00000001"
        );
        assert_ne!(first.session_id, second.session_id);
    }

    #[test]
    fn sandbox_gateway_rejects_empty_checkouts() {
        let gateway = SandboxCheckoutGateway::new("https://checkout.sandbox.local/session");
        let err = gateway
            .create_checkout(request(Vec::new()))
            .expect_err("empty checkout rejected");
        assert!(matches!(err, GatewayError::Rejected(_)));
    }
}
