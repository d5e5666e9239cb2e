//! Reconciliation Domain
//!
//! Recomputes authoritative payment figures for a tenant directly from
//! gateway records, independent of the locally maintained state.
//!
//! # Components
//!
//! - **Analytics Engine**: revenue, rates, fees and booking/subscription
//!   sub-aggregates over a period of whole days
//! - **Report Generator**: analytics in a report envelope, rendered as JSON or
//!   CSV into a report artifact store
//! - **Reconciliation Engine**: day-level figures plus the payments whose local
//!   status disagrees with the gateway, and their repair
//!
//! Analytics reads are never retried; a failed read surfaces with the
//! gateway's message and the caller may simply run the operation again.

pub mod adapters;
pub mod analytics;
pub mod error;
pub mod ports;
pub mod reconciliation;
pub mod report;

pub use analytics::{
    percentage, ActivitySnapshot, AnalyticsEngine, BookingPaymentMetrics, PaymentAnalytics,
    SubscriptionMetrics,
};
pub use error::ReconciliationError;
pub use ports::{ReportArtifact, ReportArtifactStore};
pub use reconciliation::{
    Discrepancy, DiscrepancyKind, Reconciliation, ReconciliationEngine, ReconciliationSummary,
    RepairReport, SkippedRepair,
};
pub use report::{
    GeneratedReport, PaymentReport, RefundLine, ReportFormat, ReportGenerator, ReportPeriod,
    ReportRequest,
};
