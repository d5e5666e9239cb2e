//! Payment reports
//!
//! A report wraps the analytics for a period in an envelope that echoes the
//! requested period, optionally lists the refunds issued in it, and is
//! rendered as JSON or CSV into the artifact store.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use core_kernel::{DateRange, Money, PaymentIntentId, RefundId, ReportId, TenantId};
use domain_payments::refund::RefundStatus;
use domain_payments::Refund;

use crate::analytics::{AnalyticsEngine, PaymentAnalytics};
use crate::error::ReconciliationError;
use crate::ports::{ReportArtifact, ReportArtifactStore};

/// Rendering of a report artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Json => "application/json",
            ReportFormat::Csv => "text/csv",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ReportFormat {
    type Err = ReconciliationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            other => Err(ReconciliationError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub include_refunds: bool,
    #[serde(default)]
    pub format: ReportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundLine {
    pub refund_id: RefundId,
    pub payment_intent_id: PaymentIntentId,
    pub amount: Money,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Refund> for RefundLine {
    fn from(refund: &Refund) -> Self {
        Self {
            refund_id: refund.id.clone(),
            payment_intent_id: refund.payment_intent_id.clone(),
            amount: refund.amount,
            status: refund.status,
            created_at: refund.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReport {
    pub id: ReportId,
    pub tenant_id: TenantId,
    pub report_period: ReportPeriod,
    pub generated_at: DateTime<Utc>,
    pub analytics: PaymentAnalytics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refunds: Option<Vec<RefundLine>>,
}

/// A generated report and where to download it
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedReport {
    pub report: PaymentReport,
    pub format: ReportFormat,
    pub download_url: String,
}

/// Renders a report in `format`
pub fn render(report: &PaymentReport, format: ReportFormat) -> Result<Vec<u8>, ReconciliationError> {
    match format {
        ReportFormat::Json => serde_json::to_vec_pretty(report).map_err(|e| ReconciliationError::Render(e.to_string())),
        ReportFormat::Csv => render_csv(report),
    }
}

fn render_csv(report: &PaymentReport) -> Result<Vec<u8>, ReconciliationError> {
    let render_err = |e: csv::Error| ReconciliationError::Render(e.to_string());
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    let analytics = &report.analytics;

    let mut rows: Vec<(String, String)> = vec![
        ("report_id".into(), report.id.to_string()),
        ("tenant_id".into(), report.tenant_id.to_string()),
        ("period_start".into(), report.report_period.start.to_string()),
        ("period_end".into(), report.report_period.end.to_string()),
        ("currency".into(), analytics.currency.to_string()),
        ("total_revenue".into(), analytics.total_revenue.to_decimal().to_string()),
        ("gross_revenue".into(), analytics.gross_revenue.to_decimal().to_string()),
        ("refunded_amount".into(), analytics.refunded_amount.to_decimal().to_string()),
        ("total_transactions".into(), analytics.total_transactions.to_string()),
        ("successful_transactions".into(), analytics.successful_transactions.to_string()),
        ("success_rate".into(), analytics.success_rate.to_string()),
        ("refund_rate".into(), analytics.refund_rate.to_string()),
        ("average_transaction_value".into(), analytics.average_transaction_value.to_decimal().to_string()),
        ("platform_fees".into(), analytics.platform_fees.to_decimal().to_string()),
    ];
    for (status, count) in &analytics.status_breakdown {
        rows.push((format!("status_{status}"), count.to_string()));
    }
    let booking = &analytics.booking_payments;
    rows.push(("booking_revenue".into(), booking.total_booking_revenue.to_decimal().to_string()));
    rows.push(("booking_deposits".into(), booking.deposits.to_string()));
    rows.push(("booking_full_payments".into(), booking.full_payments.to_string()));
    rows.push(("booking_remaining_balances".into(), booking.remaining_balances.to_string()));
    let subscriptions = &analytics.subscription_metrics;
    rows.push(("active_subscriptions".into(), subscriptions.active_subscriptions.to_string()));
    rows.push(("monthly_recurring_revenue".into(), subscriptions.monthly_recurring_revenue.to_decimal().to_string()));
    rows.push(("churn_rate".into(), subscriptions.churn_rate.to_string()));

    writer.write_record(["metric", "value"]).map_err(render_err)?;
    for (metric, value) in &rows {
        writer.write_record([metric.as_str(), value.as_str()]).map_err(render_err)?;
    }

    if let Some(refunds) = &report.refunds {
        writer.write_record([""]).map_err(render_err)?;
        writer
            .write_record(["refund_id", "payment_intent_id", "amount", "status", "created_at"])
            .map_err(render_err)?;
        for line in refunds {
            writer
                .write_record([
                    line.refund_id.as_str().to_string(),
                    line.payment_intent_id.as_str().to_string(),
                    line.amount.to_decimal().to_string(),
                    line.status.as_str().to_string(),
                    line.created_at.to_rfc3339(),
                ])
                .map_err(render_err)?;
        }
    }

    writer
        .into_inner()
        .map_err(|e| ReconciliationError::Render(e.to_string()))
}

/// Builds, renders and stores payment reports
#[derive(Clone)]
pub struct ReportGenerator {
    analytics: AnalyticsEngine,
    artifacts: Arc<dyn ReportArtifactStore>,
}

impl ReportGenerator {
    pub fn new(analytics: AnalyticsEngine, artifacts: Arc<dyn ReportArtifactStore>) -> Self {
        Self { analytics, artifacts }
    }

    pub async fn generate_payment_report(
        &self,
        tenant_id: TenantId,
        request: ReportRequest,
    ) -> Result<GeneratedReport, ReconciliationError> {
        let period = DateRange::new(request.start_date, request.end_date)?;
        let snapshot = self.analytics.load_activity(tenant_id, period).await?;
        let analytics = PaymentAnalytics::from_snapshot(&snapshot, self.analytics.currency())?;

        let refunds = request
            .include_refunds
            .then(|| snapshot.refunds.iter().map(RefundLine::from).collect());

        let report = PaymentReport {
            id: ReportId::new_v7(),
            tenant_id,
            report_period: ReportPeriod {
                start: request.start_date,
                end: request.end_date,
            },
            generated_at: Utc::now(),
            analytics,
            refunds,
        };

        let content = render(&report, request.format)?;
        let download_url = self
            .artifacts
            .put(ReportArtifact {
                tenant_id,
                report_id: report.id,
                format: request.format,
                content,
            })
            .await
            .map_err(|e| {
                warn!(tenant_id = %tenant_id, report_id = %report.id, error = %e, "failed to store report artifact");
                e
            })?;

        info!(
            tenant_id = %tenant_id,
            report_id = %report.id,
            format = %request.format,
            "generated payment report"
        );

        Ok(GeneratedReport {
            report,
            format: request.format,
            download_url,
        })
    }

    /// Loads a previously stored artifact
    pub async fn fetch_artifact(
        &self,
        tenant_id: TenantId,
        report_id: ReportId,
        format: ReportFormat,
    ) -> Result<ReportArtifact, ReconciliationError> {
        Ok(self.artifacts.get(tenant_id, report_id, format).await?)
    }
}
