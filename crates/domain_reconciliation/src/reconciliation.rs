//! Day-level reconciliation
//!
//! Recomputes a tenant's figures for one UTC day from gateway records and
//! compares every gateway payment with the locally mirrored one. Running a
//! reconciliation only reads; [`ReconciliationEngine::repair_discrepancies`]
//! applies the legal transitions it found.
//!
//! Reconciliation is idempotent: two runs for the same tenant and date give
//! the same figures as long as the gateway data for that date is unchanged.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use core_kernel::{Currency, DateRange, Money, PaymentIntentId, TenantId};
use domain_payments::events::emit;
use domain_payments::{
    PaymentContext, PaymentEvent, PaymentIntent, PaymentStatus, PaymentStorePort, ProcessorError,
    TransitionSource,
};

use crate::analytics::{AnalyticsEngine, PaymentAnalytics};
use crate::error::ReconciliationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// The local record has a different status than the gateway
    StatusMismatch,
    /// The gateway knows a payment the local store does not
    MissingLocally,
}

/// A payment whose local state disagrees with the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub payment_intent_id: PaymentIntentId,
    pub kind: DiscrepancyKind,
    pub local_status: Option<PaymentStatus>,
    pub gateway_status: PaymentStatus,
    /// The local record can be brought in line without an illegal transition
    pub repairable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    /// Payments that succeeded, including ones refunded since
    pub successful_payments: u64,
    pub failed_payments: u64,
    pub pending_payments: u64,
    pub refunded_payments: u64,
    pub total_revenue: Money,
    pub platform_fees: Money,
}

impl ReconciliationSummary {
    fn from_analytics(analytics: &PaymentAnalytics) -> Self {
        let count = |status: PaymentStatus| {
            analytics
                .status_breakdown
                .get(status.as_str())
                .copied()
                .unwrap_or(0)
        };
        Self {
            successful_payments: analytics.successful_transactions,
            failed_payments: count(PaymentStatus::Failed),
            pending_payments: count(PaymentStatus::Pending),
            refunded_payments: count(PaymentStatus::Refunded),
            total_revenue: analytics.total_revenue,
            platform_fees: analytics.platform_fees,
        }
    }
}

/// Result of reconciling one tenant for one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub tenant_id: TenantId,
    pub date: NaiveDate,
    /// Number of gateway payments created on `date`
    pub total_processed: u64,
    pub summary: ReconciliationSummary,
    pub discrepancies: Vec<Discrepancy>,
    pub completed_at: DateTime<Utc>,
}

impl Reconciliation {
    /// Figures without the run timestamp, for comparing runs
    pub fn figures(&self) -> (u64, &ReconciliationSummary, &[Discrepancy]) {
        (self.total_processed, &self.summary, &self.discrepancies)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRepair {
    pub payment_intent_id: PaymentIntentId,
    pub reason: String,
}

/// What a repair run changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    /// Local status brought in line with the gateway
    pub repaired: Vec<PaymentIntentId>,
    /// Gateway payments copied into the local store
    pub imported: Vec<PaymentIntentId>,
    pub skipped: Vec<SkippedRepair>,
}

/// Runs reconciliations and repairs
#[derive(Clone)]
pub struct ReconciliationEngine {
    ctx: PaymentContext,
    analytics: AnalyticsEngine,
}

impl ReconciliationEngine {
    pub fn new(ctx: PaymentContext, currency: Currency) -> Self {
        let analytics = AnalyticsEngine::new(ctx.gateway.clone(), currency);
        Self { ctx, analytics }
    }

    pub fn analytics(&self) -> &AnalyticsEngine {
        &self.analytics
    }

    pub async fn reconcile_payments(&self, tenant_id: TenantId, date: NaiveDate) -> Result<Reconciliation, ReconciliationError> {
        let snapshot = self
            .analytics
            .load_activity(tenant_id, DateRange::single_day(date))
            .await?;
        let analytics = PaymentAnalytics::from_snapshot(&snapshot, self.analytics.currency())?;

        let mut discrepancies = Vec::new();
        for remote in &snapshot.intents {
            if let Some(discrepancy) = self.compare(remote).await? {
                discrepancies.push(discrepancy);
            }
        }

        let reconciliation = Reconciliation {
            tenant_id,
            date,
            total_processed: analytics.total_transactions,
            summary: ReconciliationSummary::from_analytics(&analytics),
            discrepancies,
            completed_at: Utc::now(),
        };

        if reconciliation.discrepancies.is_empty() {
            info!(
                tenant_id = %tenant_id,
                date = %date,
                total_processed = reconciliation.total_processed,
                "reconciliation completed"
            );
        } else {
            warn!(
                tenant_id = %tenant_id,
                date = %date,
                total_processed = reconciliation.total_processed,
                discrepancies = reconciliation.discrepancies.len(),
                "reconciliation found discrepancies"
            );
        }

        emit(
            self.ctx.audit.as_ref(),
            PaymentEvent::ReconciliationCompleted {
                tenant_id,
                date,
                total_processed: reconciliation.total_processed,
                discrepancies: reconciliation.discrepancies.len(),
            },
        )
        .await;

        Ok(reconciliation)
    }

    async fn compare(&self, remote: &PaymentIntent) -> Result<Option<Discrepancy>, ReconciliationError> {
        let local = self.ctx.store.find_payment_intent(&remote.id).await?;
        Ok(match local {
            None => Some(Discrepancy {
                payment_intent_id: remote.id.clone(),
                kind: DiscrepancyKind::MissingLocally,
                local_status: None,
                gateway_status: remote.status,
                repairable: true,
            }),
            Some(local) if local.status != remote.status => Some(Discrepancy {
                payment_intent_id: remote.id.clone(),
                kind: DiscrepancyKind::StatusMismatch,
                local_status: Some(local.status),
                gateway_status: remote.status,
                repairable: local.status.can_transition_to(remote.status),
            }),
            Some(_) => None,
        })
    }

    /// Applies the gateway state to local records where that is legal.
    ///
    /// Status mismatches go through the payment lifecycle, so illegal
    /// transitions are audited and skipped. Payments missing locally are
    /// fetched from the gateway and stored.
    pub async fn repair_discrepancies(&self, reconciliation: &Reconciliation) -> Result<RepairReport, ReconciliationError> {
        let mut report = RepairReport::default();

        for discrepancy in &reconciliation.discrepancies {
            let id = &discrepancy.payment_intent_id;
            match discrepancy.kind {
                DiscrepancyKind::StatusMismatch => {
                    match self
                        .ctx
                        .lifecycle
                        .apply_status(id, discrepancy.gateway_status, TransitionSource::Reconciliation)
                        .await
                    {
                        Ok(_) => report.repaired.push(id.clone()),
                        Err(error @ ProcessorError::InvalidStatusTransition { .. }) => {
                            report.skipped.push(SkippedRepair {
                                payment_intent_id: id.clone(),
                                reason: error.to_string(),
                            });
                        }
                        Err(error) => return Err(error.into()),
                    }
                }
                DiscrepancyKind::MissingLocally => {
                    let intent = self
                        .ctx
                        .retry
                        .execute_with_retry("retrieve_payment_intent", || {
                            self.ctx.gateway.retrieve_payment_intent(id)
                        })
                        .await
                        .into_result()?;
                    if intent.tenant_id != reconciliation.tenant_id {
                        report.skipped.push(SkippedRepair {
                            payment_intent_id: id.clone(),
                            reason: "Payment does not belong to this tenant".to_string(),
                        });
                        continue;
                    }
                    self.ctx.store.save_payment_intent(&intent).await?;
                    report.imported.push(id.clone());
                }
            }
        }

        info!(
            tenant_id = %reconciliation.tenant_id,
            date = %reconciliation.date,
            repaired = report.repaired.len(),
            imported = report.imported.len(),
            skipped = report.skipped.len(),
            "repaired reconciliation discrepancies"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::TimeZone;
    use domain_payments::adapters::InMemoryPaymentStore;
    use domain_payments::ports::mock::{MockPaymentGateway, RecordingAuditSink};
    use domain_payments::RetryOptions;

    struct Harness {
        gateway: Arc<MockPaymentGateway>,
        store: Arc<InMemoryPaymentStore>,
        audit: Arc<RecordingAuditSink>,
        engine: ReconciliationEngine,
    }

    fn harness() -> Harness {
        let gateway = Arc::new(MockPaymentGateway::new());
        let store = Arc::new(InMemoryPaymentStore::new());
        let audit = Arc::new(RecordingAuditSink::new());
        let ctx = PaymentContext::new(gateway.clone(), store.clone(), audit.clone(), RetryOptions::immediate(2));
        Harness {
            engine: ReconciliationEngine::new(ctx, Currency::USD),
            gateway,
            store,
            audit,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn intent(tenant_id: TenantId, id: &str, status: PaymentStatus) -> PaymentIntent {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        PaymentIntent {
            id: PaymentIntentId::new(id),
            tenant_id,
            amount: Money::from_minor(2_500, Currency::USD),
            status,
            destination: None,
            application_fee: None,
            metadata: HashMap::new(),
            client_secret: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_idle_day_reports_zeros() {
        let h = harness();
        let reconciliation = h.engine.reconcile_payments(TenantId::new(), date()).await.unwrap();
        assert_eq!(reconciliation.total_processed, 0);
        assert_eq!(reconciliation.summary.successful_payments, 0);
        assert!(reconciliation.summary.total_revenue.is_zero());
        assert!(reconciliation.discrepancies.is_empty());
        assert_eq!(h.audit.count("reconciliation_completed").await, 1);
    }

    #[tokio::test]
    async fn test_rerun_yields_same_figures() {
        let h = harness();
        let tenant = TenantId::new();
        let paid = intent(tenant, "pi_1", PaymentStatus::Succeeded);
        h.gateway.insert_intent(paid.clone()).await;
        h.store.save_payment_intent(&paid).await.unwrap();

        let first = h.engine.reconcile_payments(tenant, date()).await.unwrap();
        let second = h.engine.reconcile_payments(tenant, date()).await.unwrap();
        assert_eq!(first.figures(), second.figures());
        assert_eq!(first.total_processed, 1);
        assert_eq!(first.summary.total_revenue, Money::from_minor(2_500, Currency::USD));
    }

    #[tokio::test]
    async fn test_status_mismatch_is_repaired() {
        let h = harness();
        let tenant = TenantId::new();
        h.gateway.insert_intent(intent(tenant, "pi_1", PaymentStatus::Succeeded)).await;
        h.store
            .save_payment_intent(&intent(tenant, "pi_1", PaymentStatus::Pending))
            .await
            .unwrap();

        let reconciliation = h.engine.reconcile_payments(tenant, date()).await.unwrap();
        assert_eq!(reconciliation.discrepancies.len(), 1);
        let discrepancy = &reconciliation.discrepancies[0];
        assert_eq!(discrepancy.kind, DiscrepancyKind::StatusMismatch);
        assert_eq!(discrepancy.local_status, Some(PaymentStatus::Pending));
        assert!(discrepancy.repairable);

        let repair = h.engine.repair_discrepancies(&reconciliation).await.unwrap();
        assert_eq!(repair.repaired, vec![PaymentIntentId::new("pi_1")]);

        let local = h.store.find_payment_intent(&PaymentIntentId::new("pi_1")).await.unwrap().unwrap();
        assert_eq!(local.status, PaymentStatus::Succeeded);
        let rerun = h.engine.reconcile_payments(tenant, date()).await.unwrap();
        assert!(rerun.discrepancies.is_empty());
    }

    #[tokio::test]
    async fn test_illegal_repair_is_skipped() {
        let h = harness();
        let tenant = TenantId::new();
        h.gateway.insert_intent(intent(tenant, "pi_1", PaymentStatus::Succeeded)).await;
        h.store
            .save_payment_intent(&intent(tenant, "pi_1", PaymentStatus::Failed))
            .await
            .unwrap();

        let reconciliation = h.engine.reconcile_payments(tenant, date()).await.unwrap();
        assert!(!reconciliation.discrepancies[0].repairable);

        let repair = h.engine.repair_discrepancies(&reconciliation).await.unwrap();
        assert!(repair.repaired.is_empty());
        assert_eq!(repair.skipped.len(), 1);
        assert_eq!(h.audit.count("transition_rejected").await, 1);
    }

    #[tokio::test]
    async fn test_missing_payment_is_imported() {
        let h = harness();
        let tenant = TenantId::new();
        h.gateway.insert_intent(intent(tenant, "pi_9", PaymentStatus::Pending)).await;

        let reconciliation = h.engine.reconcile_payments(tenant, date()).await.unwrap();
        assert_eq!(reconciliation.discrepancies[0].kind, DiscrepancyKind::MissingLocally);

        let repair = h.engine.repair_discrepancies(&reconciliation).await.unwrap();
        assert_eq!(repair.imported, vec![PaymentIntentId::new("pi_9")]);
        assert!(h.store.find_payment_intent(&PaymentIntentId::new("pi_9")).await.unwrap().is_some());
    }
}
