//! Analytics, report and reconciliation DTOs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use domain_reconciliation::{PaymentAnalytics, Reconciliation, RepairReport, ReportPeriod};

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub period: ReportPeriod,
    pub analytics: PaymentAnalytics,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub date: NaiveDate,
    /// Apply legal status corrections to the local store afterwards
    #[serde(default)]
    pub repair: bool,
}

#[derive(Debug, Serialize)]
pub struct ReconciliationResponse {
    pub reconciliation: Reconciliation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair: Option<RepairReport>,
}
