use crate::infra::{build_services, ApiReviewService};
use clap::Args;
use permit_workflow::config::AppConfig;
use permit_workflow::error::AppError;
use permit_workflow::workflows::fees::{
    CallbackOutcome, FeeCalculation, FeeCalculator, FeeOutcome, FeeQuery, FeeSchedule,
    GatewayCallback, GatewayPaymentStatus, PaymentRequest,
};
use permit_workflow::workflows::review::{
    ActingUser, ApplicationDraft, ApplicationId, ApplicationKind, ApplicationRecord,
    DirectorateDecision, DirectorateRequest, DirectorateStatus, PermitStatus, ReviewStage,
    StaffPosition, StaffUnit, StageSubmission,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct FeeQuoteArgs {
    /// Activity type as listed in the fee schedule
    #[arg(long)]
    pub(crate) activity: String,
    /// Permit level, e.g. "Level 2"
    #[arg(long)]
    pub(crate) level: String,
    /// Activity category used to steer estimates
    #[arg(long)]
    pub(crate) category: Option<String>,
    /// CSV fee schedule to quote from instead of the configured one
    #[arg(long)]
    pub(crate) schedule: Option<PathBuf>,
    /// Print the quote as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Activity type of the demo application
    #[arg(long, default_value = "Mining")]
    pub(crate) activity: String,
    /// Permit level of the demo application
    #[arg(long, default_value = "Level 2")]
    pub(crate) level: String,
    /// Applicant shown on the invoice
    #[arg(long, default_value = "Highlands Gold Ltd")]
    pub(crate) applicant: String,
    /// Settle fees through the sandbox checkout instead of a manual receipt
    #[arg(long)]
    pub(crate) gateway: bool,
}

pub(crate) fn run_fee_quote(args: FeeQuoteArgs) -> Result<(), AppError> {
    let FeeQuoteArgs {
        activity,
        level,
        category,
        schedule,
        json,
    } = args;

    let schedule = match schedule {
        Some(path) => FeeSchedule::from_path(path)?,
        None => AppConfig::load()?.fees.load_schedule()?,
    };
    let calculator = FeeCalculator::new(Arc::new(schedule));
    let mut query = FeeQuery::new(activity, level);
    if let Some(category) = category {
        query = query.with_category(category);
    }
    let outcome = calculator.calculate(&query);

    if json {
        let rendered = serde_json::to_string_pretty(&outcome).map_err(std::io::Error::from)?;
        println!("{rendered}");
        return Ok(());
    }

    println!(
        "Fee quote for {} ({})",
        query.activity_type, query.permit_level
    );
    match outcome {
        FeeOutcome::Calculated(calculation) => render_calculation(&calculation),
        FeeOutcome::NotCalculable { reason } => {
            println!("- No fee can be quoted: {}", reason.describe());
        }
    }
    Ok(())
}

fn render_calculation(calculation: &FeeCalculation) {
    println!("- Source: {}", calculation.source.label());
    if calculation.is_estimated {
        println!(
            "  Estimated from {} ({}); fees may change upon official processing",
            calculation.basis_activity, calculation.permit_level
        );
    }
    println!(
        "- Administration fee: {:.2} (form {})",
        calculation.administration_fee, calculation.administration_form
    );
    println!(
        "- Technical fee: {:.2} (form {})",
        calculation.technical_fee, calculation.technical_form
    );
    println!("- Total: {:.2}", calculation.total_fee);
    println!("- Processing time: {} days", calculation.processing_days);
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        activity,
        level,
        applicant,
        gateway,
    } = args;

    let config = AppConfig::load()?;
    let services = build_services(&config)?;
    let reviews = services.reviews.as_ref();
    let payments = services.payments.as_ref();

    let applicant_user = ActingUser::public("demo-applicant").with_display_name(applicant.clone());
    let registry = ActingUser::staff("demo-registry", Some(StaffUnit::Registry), Some(StaffPosition::Officer));
    let compliance = ActingUser::staff(
        "demo-compliance",
        Some(StaffUnit::Compliance),
        Some(StaffPosition::Officer),
    );
    let revenue = ActingUser::staff("demo-revenue", Some(StaffUnit::Revenue), Some(StaffPosition::Officer));
    let managing_director = ActingUser::staff("demo-md", None, Some(StaffPosition::ManagingDirector));
    let directorate = ActingUser::staff(
        "demo-directorate",
        Some(StaffUnit::Directorate),
        Some(StaffPosition::Director),
    );

    println!("Permit review demo");
    let record = reviews.submit(
        ApplicationDraft {
            kind: ApplicationKind::Permit,
            entity_reference: "ENT-DEMO-1".to_string(),
            applicant_name: applicant,
            activity_type: activity,
            permit_level: level,
            activity_category: None,
            documents: Vec::new(),
        },
        &applicant_user,
    )?;
    let id = record.id.clone();
    println!(
        "- Submitted {} ({} / {}) -> {}",
        id,
        record.activity_type,
        record.permit_level,
        record.status.label()
    );

    advance(reviews, &id, ReviewStage::Registry, PermitStatus::UnderReview, &registry)?;
    advance(reviews, &id, ReviewStage::Registry, PermitStatus::RegistryApproved, &registry)?;

    let invoice = payments.assess_fees(&id, &applicant_user)?;
    println!(
        "- Invoice {} issued: {:.2} {} ({}{})",
        invoice.invoice_number,
        invoice.total_fee,
        invoice.currency,
        invoice.fee_source.label(),
        if invoice.is_estimated { ", estimated" } else { "" }
    );

    match reviews.submit_stage_review(
        ReviewStage::Compliance,
        &id,
        review(PermitStatus::ComplianceReview),
        &compliance,
    ) {
        Ok(_) => println!("  Compliance review opened before payment"),
        Err(err) => println!("  Compliance review blocked: {err}"),
    }

    let outstanding = invoice.outstanding_balance();
    if gateway {
        let session = payments.start_checkout(&id, &applicant_user)?;
        println!("- Checkout opened: {}", session.redirect_url);
        let callback = GatewayCallback {
            session_id: session.session_id.clone(),
            payment_status: GatewayPaymentStatus::Paid,
            amount_paid: outstanding,
            receipt_url: Some(format!("{}/receipt", session.redirect_url)),
        };
        let body = serde_json::to_vec(&callback).map_err(std::io::Error::from)?;
        let signature = config
            .payments
            .webhook_secret
            .sign(&body)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))?;
        for attempt in ["signed callback", "replayed callback"] {
            let outcome = payments.apply_signed_callback(Some(&signature), &body)?;
            report_callback(attempt, &outcome);
        }
    } else {
        let paid = payments.record_payment(
            &id,
            PaymentRequest {
                amount: outstanding,
                reference: "DEMO-RECEIPT-1".to_string(),
                receipt_url: None,
            },
            &revenue,
        )?;
        println!(
            "- Receipt recorded by revenue: {} (outstanding {:.2})",
            paid.payment_status.label(),
            paid.outstanding_balance()
        );
    }

    for (stage, target, actor) in [
        (ReviewStage::Compliance, PermitStatus::ComplianceReview, &compliance),
        (ReviewStage::Compliance, PermitStatus::ComplianceApproved, &compliance),
        (ReviewStage::Compliance, PermitStatus::MdReview, &compliance),
        (ReviewStage::ManagingDirector, PermitStatus::Approved, &managing_director),
    ] {
        advance(reviews, &id, stage, target, actor)?;
    }

    reviews.request_directorate_approval(&id, DirectorateRequest::default(), &managing_director)?;
    println!("- Directorate sign-off requested");
    reviews.decide_directorate(
        &id,
        DirectorateDecision {
            decision: DirectorateStatus::Approved,
            notes: Some("Demo approval".to_string()),
        },
        &directorate,
    )?;
    println!("- Directorate approved");
    let signed = reviews.sign_letter(&id, &managing_director)?;
    println!("- Approval letter signed; final status {}", signed.status.label());

    println!("\nStatus history");
    for change in &signed.history {
        println!(
            "  {} -> {} by {}",
            change.from.map(PermitStatus::label).unwrap_or("-"),
            change.to.label(),
            change.actor
        );
    }

    let document = payments.render_invoice(&id, &applicant_user)?;
    println!("\nInvoice {}", document.file_name);
    println!("{}", String::from_utf8_lossy(&document.bytes));
    println!(
        "{} application(s) held in the demo store",
        services.store.application_count()
    );
    Ok(())
}

fn review(target: PermitStatus) -> StageSubmission {
    StageSubmission {
        assessment: "Demo assessment: documents complete".to_string(),
        remarks: None,
        proposed_action: "Proceed".to_string(),
        target_status: target,
        documents: Vec::new(),
        expected_version: None,
    }
}

fn advance(
    reviews: &ApiReviewService,
    id: &ApplicationId,
    stage: ReviewStage,
    target: PermitStatus,
    actor: &ActingUser,
) -> Result<ApplicationRecord, AppError> {
    let record = reviews.submit_stage_review(stage, id, review(target), actor)?;
    println!(
        "- {} review by {} -> {}",
        stage.label(),
        actor.user_id,
        record.status.label()
    );
    Ok(record)
}

fn report_callback(attempt: &str, outcome: &CallbackOutcome) {
    let record = outcome.record();
    println!(
        "- Gateway {attempt}: {} (paid {:.2}, status {})",
        outcome.label(),
        record.amount_paid,
        record.payment_status.label()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_calculation_handles_estimates() {
        let calculator = FeeCalculator::new(Arc::new(FeeSchedule::standard()));
        let outcome = calculator.calculate(&FeeQuery::new("Unknown Activity", "Level 1"));
        let calculation = outcome.calculation().expect("estimated");
        assert!(calculation.is_estimated);
        render_calculation(calculation);
    }

    #[test]
    fn fee_quote_reads_an_explicit_schedule() {
        let path = std::env::temp_dir().join(format!("permit-fees-{}.csv", std::process::id()));
        std::fs::write(
            &path,
            "activity_type,activity_category,permit_level,administration_fee,technical_fee,administration_form,technical_form,processing_days\nMining,Extractive,Level 2,500,1500,A,B,60\n",
        )
        .expect("write schedule");

        let result = run_fee_quote(FeeQuoteArgs {
            activity: "Mining".to_string(),
            level: "Level 2".to_string(),
            category: None,
            schedule: Some(path.clone()),
            json: true,
        });
        std::fs::remove_file(&path).ok();
        result.expect("quote succeeds");
    }

    #[test]
    fn fee_quote_reports_missing_schedule_files() {
        let err = run_fee_quote(FeeQuoteArgs {
            activity: "Mining".to_string(),
            level: "Level 2".to_string(),
            category: None,
            schedule: Some(PathBuf::from("/nonexistent/fees.csv")),
            json: false,
        })
        .expect_err("missing file");
        assert!(matches!(err, AppError::FeeSchedule(_)));
    }
}
