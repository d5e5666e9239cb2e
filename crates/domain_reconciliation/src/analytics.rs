//! Payment analytics
//!
//! Figures are recomputed from gateway records for a tenant and a period of
//! whole UTC days. Analytics are per currency: records in another currency
//! are left out of every figure.
//!
//! A payment counts as successful if it ever succeeded, so refunded payments
//! are part of the gross revenue and of the success rate. Refunds issued
//! during the period are deducted from the gross to give `total_revenue`.
//!
//! Rates are percentages rounded half away from zero to two decimal places.
//! An empty period yields all-zero analytics.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use core_kernel::{Currency, DateRange, Money, MoneyError, PaymentIntentId, TenantId};
use domain_payments::intent::METADATA_PAYMENT_TYPE;
use domain_payments::{
    classify_error, GatewayQuery, PaymentGatewayPort, PaymentIntent, PaymentStatus, PaymentType,
    Refund, Subscription, SubscriptionStatus,
};
use domain_payments::refund::RefundStatus;

use crate::error::ReconciliationError;

/// Booking payment sub-aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPaymentMetrics {
    /// Gross amount of successful booking payments
    pub total_booking_revenue: Money,
    pub deposits: u64,
    pub full_payments: u64,
    pub remaining_balances: u64,
}

/// Platform subscription sub-aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMetrics {
    /// Subscriptions currently billing (active, trialing or past due)
    pub active_subscriptions: u64,
    pub monthly_recurring_revenue: Money,
    /// Share of subscriptions canceled during the period, in percent
    pub churn_rate: Decimal,
}

/// Aggregated payment figures for one tenant and period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAnalytics {
    pub currency: Currency,
    /// Gross revenue less refunds issued in the period
    pub total_revenue: Money,
    pub gross_revenue: Money,
    pub refunded_amount: Money,
    pub total_transactions: u64,
    pub successful_transactions: u64,
    pub success_rate: Decimal,
    pub refund_rate: Decimal,
    pub average_transaction_value: Money,
    pub platform_fees: Money,
    /// Count per payment status; every status is present
    pub status_breakdown: BTreeMap<String, u64>,
    pub booking_payments: BookingPaymentMetrics,
    pub subscription_metrics: SubscriptionMetrics,
}

/// Gateway records for one tenant and period
#[derive(Debug, Clone)]
pub struct ActivitySnapshot {
    pub tenant_id: TenantId,
    pub period: DateRange,
    pub intents: Vec<PaymentIntent>,
    pub refunds: Vec<Refund>,
    /// Every subscription of the tenant, in any status
    pub subscriptions: Vec<Subscription>,
}

impl ActivitySnapshot {
    pub fn empty(tenant_id: TenantId, period: DateRange) -> Self {
        Self {
            tenant_id,
            period,
            intents: Vec::new(),
            refunds: Vec::new(),
            subscriptions: Vec::new(),
        }
    }
}

/// `part / whole` as a percentage with two decimal places; zero when `whole` is zero
pub fn percentage(part: u64, whole: u64) -> Decimal {
    if whole == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(whole))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn ever_succeeded(intent: &PaymentIntent) -> bool {
    matches!(intent.status, PaymentStatus::Succeeded | PaymentStatus::Refunded)
}

fn payment_type_of(intent: &PaymentIntent) -> Option<PaymentType> {
    intent
        .metadata
        .get(METADATA_PAYMENT_TYPE)
        .and_then(|value| value.parse().ok())
}

impl PaymentAnalytics {
    /// All-zero analytics
    pub fn empty(currency: Currency) -> Self {
        let zero = Money::zero(currency);
        Self {
            currency,
            total_revenue: zero,
            gross_revenue: zero,
            refunded_amount: zero,
            total_transactions: 0,
            successful_transactions: 0,
            success_rate: Decimal::ZERO,
            refund_rate: Decimal::ZERO,
            average_transaction_value: zero,
            platform_fees: zero,
            status_breakdown: PaymentStatus::ALL
                .iter()
                .map(|s| (s.as_str().to_string(), 0))
                .collect(),
            booking_payments: BookingPaymentMetrics {
                total_booking_revenue: zero,
                deposits: 0,
                full_payments: 0,
                remaining_balances: 0,
            },
            subscription_metrics: SubscriptionMetrics {
                active_subscriptions: 0,
                monthly_recurring_revenue: zero,
                churn_rate: Decimal::ZERO,
            },
        }
    }

    /// Aggregates a snapshot in `currency`
    pub fn from_snapshot(snapshot: &ActivitySnapshot, currency: Currency) -> Result<Self, MoneyError> {
        let mut analytics = Self::empty(currency);

        let intents: Vec<&PaymentIntent> = snapshot
            .intents
            .iter()
            .filter(|i| i.amount.currency() == currency)
            .collect();
        let skipped = snapshot.intents.len() - intents.len();
        if skipped > 0 {
            debug!(tenant_id = %snapshot.tenant_id, skipped, currency = %currency, "skipped payments in other currencies");
        }

        analytics.total_transactions = intents.len() as u64;
        for intent in &intents {
            *analytics
                .status_breakdown
                .entry(intent.status.as_str().to_string())
                .or_default() += 1;
        }

        let successful: Vec<&PaymentIntent> = intents.iter().copied().filter(|i| ever_succeeded(i)).collect();
        analytics.successful_transactions = successful.len() as u64;
        analytics.gross_revenue = Money::sum(successful.iter().map(|i| &i.amount), currency)?;
        analytics.platform_fees = Money::sum(
            successful
                .iter()
                .filter_map(|i| i.application_fee.as_ref())
                .filter(|fee| fee.currency() == currency),
            currency,
        )?;

        let settled_refunds: Vec<&Refund> = snapshot
            .refunds
            .iter()
            .filter(|r| r.status == RefundStatus::Succeeded && r.amount.currency() == currency)
            .collect();
        analytics.refunded_amount = Money::sum(settled_refunds.iter().map(|r| &r.amount), currency)?;
        analytics.total_revenue = analytics.gross_revenue.checked_sub(&analytics.refunded_amount)?;

        let refunded_payments: HashSet<&PaymentIntentId> =
            settled_refunds.iter().map(|r| &r.payment_intent_id).collect();
        let refunded_count = successful
            .iter()
            .filter(|i| i.status == PaymentStatus::Refunded || refunded_payments.contains(&i.id))
            .count() as u64;

        analytics.success_rate = percentage(analytics.successful_transactions, analytics.total_transactions);
        analytics.refund_rate = percentage(refunded_count, analytics.successful_transactions);
        if analytics.successful_transactions > 0 {
            analytics.average_transaction_value = analytics
                .gross_revenue
                .multiply(Decimal::ONE / Decimal::from(analytics.successful_transactions))?;
        }

        analytics.booking_payments = booking_metrics(&successful, currency)?;
        analytics.subscription_metrics = subscription_metrics(snapshot, currency)?;
        Ok(analytics)
    }
}

fn booking_metrics(successful: &[&PaymentIntent], currency: Currency) -> Result<BookingPaymentMetrics, MoneyError> {
    let mut metrics = BookingPaymentMetrics {
        total_booking_revenue: Money::zero(currency),
        deposits: 0,
        full_payments: 0,
        remaining_balances: 0,
    };
    for intent in successful {
        let Some(payment_type) = payment_type_of(intent) else {
            continue;
        };
        metrics.total_booking_revenue = metrics.total_booking_revenue.checked_add(&intent.amount)?;
        match payment_type {
            PaymentType::Deposit => metrics.deposits += 1,
            PaymentType::FullPayment => metrics.full_payments += 1,
            PaymentType::RemainingBalance => metrics.remaining_balances += 1,
        }
    }
    Ok(metrics)
}

fn subscription_metrics(snapshot: &ActivitySnapshot, currency: Currency) -> Result<SubscriptionMetrics, MoneyError> {
    let subscriptions: Vec<&Subscription> = snapshot
        .subscriptions
        .iter()
        .filter(|s| s.unit_amount.currency() == currency)
        .collect();

    let billing: Vec<&Subscription> = subscriptions.iter().copied().filter(|s| s.status.is_billing()).collect();
    let churned = subscriptions
        .iter()
        .filter(|s| {
            s.status == SubscriptionStatus::Canceled
                && s.canceled_at.map(|at| snapshot.period.contains(at)).unwrap_or(false)
        })
        .count() as u64;

    let mut mrr = Money::zero(currency);
    for subscription in &billing {
        mrr = mrr.checked_add(&subscription.monthly_amount()?)?;
    }

    let active = billing.len() as u64;
    Ok(SubscriptionMetrics {
        active_subscriptions: active,
        monthly_recurring_revenue: mrr,
        churn_rate: percentage(churned, active + churned),
    })
}

/// Reads gateway records and aggregates them
#[derive(Clone)]
pub struct AnalyticsEngine {
    gateway: Arc<dyn PaymentGatewayPort>,
    currency: Currency,
}

impl AnalyticsEngine {
    pub fn new(gateway: Arc<dyn PaymentGatewayPort>, currency: Currency) -> Self {
        Self { gateway, currency }
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Loads intents, refunds and subscriptions for the period.
    ///
    /// Reads are not retried; failures surface with the gateway's message.
    pub async fn load_activity(&self, tenant_id: TenantId, period: DateRange) -> Result<ActivitySnapshot, ReconciliationError> {
        let query = GatewayQuery {
            tenant_id,
            created_from: period.starts_at(),
            created_before: period.ends_before()?,
        };

        let intents = self
            .gateway
            .list_payment_intents(&query)
            .await
            .map_err(|e| classify_error(&e))?;
        let refunds = self
            .gateway
            .list_refunds(&query)
            .await
            .map_err(|e| classify_error(&e))?;
        let subscriptions = self
            .gateway
            .list_subscriptions(tenant_id)
            .await
            .map_err(|e| classify_error(&e))?;

        debug!(
            tenant_id = %tenant_id,
            start = %period.start,
            end = %period.end,
            intents = intents.len(),
            refunds = refunds.len(),
            subscriptions = subscriptions.len(),
            "loaded gateway activity"
        );

        Ok(ActivitySnapshot {
            tenant_id,
            period,
            intents,
            refunds,
            subscriptions,
        })
    }

    pub async fn get_payment_analytics(&self, tenant_id: TenantId, period: DateRange) -> Result<PaymentAnalytics, ReconciliationError> {
        let snapshot = self.load_activity(tenant_id, period).await?;
        let analytics = PaymentAnalytics::from_snapshot(&snapshot, self.currency)?;
        info!(
            tenant_id = %tenant_id,
            start = %period.start,
            end = %period.end,
            total_transactions = analytics.total_transactions,
            total_revenue = analytics.total_revenue.minor_units(),
            "computed payment analytics"
        );
        Ok(analytics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use core_kernel::{GatewayCustomerId, PriceId, RefundId, SubscriptionId, SubscriptionItemId};
    use domain_payments::ports::mock::{GatewayOperation, MockPaymentGateway};
    use domain_payments::{BillingInterval, GatewayError, PaymentErrorType};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn usd(minor: i64) -> Money {
        Money::from_minor(minor, Currency::USD)
    }

    fn day() -> DateRange {
        DateRange::single_day(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    }

    fn intent(tenant_id: TenantId, id: &str, minor: i64, status: PaymentStatus, payment_type: Option<&str>) -> PaymentIntent {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut metadata = HashMap::new();
        if let Some(payment_type) = payment_type {
            metadata.insert(METADATA_PAYMENT_TYPE.to_string(), payment_type.to_string());
        }
        PaymentIntent {
            id: PaymentIntentId::new(id),
            tenant_id,
            amount: usd(minor),
            status,
            destination: None,
            application_fee: Some(usd(minor / 10)),
            metadata,
            client_secret: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn subscription(tenant_id: TenantId, status: SubscriptionStatus, minor: i64, interval: BillingInterval) -> Subscription {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        Subscription {
            id: SubscriptionId::new(format!("sub_{minor}_{}", status.as_str())),
            tenant_id,
            customer_id: GatewayCustomerId::new("cus_1"),
            item_id: SubscriptionItemId::new("si_1"),
            plan_id: PriceId::new("price_1"),
            status,
            unit_amount: usd(minor),
            interval,
            current_period_start: at,
            current_period_end: at,
            cancel_at_period_end: false,
            canceled_at: (status == SubscriptionStatus::Canceled)
                .then(|| Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()),
            client_secret: None,
            created_at: at,
        }
    }

    #[test]
    fn test_percentage_rounds_to_two_places() {
        assert_eq!(percentage(1, 3), dec!(33.33));
        assert_eq!(percentage(2, 3), dec!(66.67));
        assert_eq!(percentage(0, 0), Decimal::ZERO);
        assert_eq!(percentage(5, 5), dec!(100));
    }

    #[test]
    fn test_empty_snapshot_is_all_zero() {
        let analytics = PaymentAnalytics::from_snapshot(&ActivitySnapshot::empty(TenantId::new(), day()), Currency::USD).unwrap();
        assert_eq!(analytics, PaymentAnalytics::empty(Currency::USD));
        assert_eq!(analytics.status_breakdown.len(), 4);
        assert!(analytics.total_revenue.is_zero());
    }

    #[test]
    fn test_aggregates_mixed_activity() {
        let tenant = TenantId::new();
        let mut snapshot = ActivitySnapshot::empty(tenant, day());
        snapshot.intents = vec![
            intent(tenant, "pi_1", 3_000, PaymentStatus::Succeeded, Some("deposit")),
            intent(tenant, "pi_2", 7_000, PaymentStatus::Succeeded, Some("remaining_balance")),
            intent(tenant, "pi_3", 5_000, PaymentStatus::Refunded, Some("full_payment")),
            intent(tenant, "pi_4", 2_000, PaymentStatus::Failed, None),
        ];
        snapshot.refunds = vec![Refund {
            id: RefundId::new("re_1"),
            payment_intent_id: PaymentIntentId::new("pi_3"),
            tenant_id: tenant,
            amount: usd(5_000),
            status: RefundStatus::Succeeded,
            reason: None,
            initiated_by: None,
            metadata: HashMap::new(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap(),
        }];

        let analytics = PaymentAnalytics::from_snapshot(&snapshot, Currency::USD).unwrap();
        assert_eq!(analytics.total_transactions, 4);
        assert_eq!(analytics.successful_transactions, 3);
        assert_eq!(analytics.gross_revenue, usd(15_000));
        assert_eq!(analytics.total_revenue, usd(10_000));
        assert_eq!(analytics.success_rate, dec!(75));
        assert_eq!(analytics.refund_rate, dec!(33.33));
        assert_eq!(analytics.average_transaction_value, usd(5_000));
        assert_eq!(analytics.platform_fees, usd(1_500));
        assert_eq!(analytics.status_breakdown["failed"], 1);
        assert_eq!(analytics.status_breakdown["pending"], 0);
        assert_eq!(analytics.booking_payments.deposits, 1);
        assert_eq!(analytics.booking_payments.remaining_balances, 1);
        assert_eq!(analytics.booking_payments.full_payments, 1);
        assert_eq!(analytics.booking_payments.total_booking_revenue, usd(15_000));
    }

    #[test]
    fn test_subscription_metrics() {
        let tenant = TenantId::new();
        let mut snapshot = ActivitySnapshot::empty(tenant, day());
        snapshot.subscriptions = vec![
            subscription(tenant, SubscriptionStatus::Active, 4_900, BillingInterval::Month),
            subscription(tenant, SubscriptionStatus::Active, 12_000, BillingInterval::Year),
            subscription(tenant, SubscriptionStatus::Canceled, 4_900, BillingInterval::Month),
            subscription(tenant, SubscriptionStatus::Incomplete, 4_900, BillingInterval::Month),
        ];

        let metrics = PaymentAnalytics::from_snapshot(&snapshot, Currency::USD)
            .unwrap()
            .subscription_metrics;
        assert_eq!(metrics.active_subscriptions, 2);
        assert_eq!(metrics.monthly_recurring_revenue, usd(5_900));
        assert_eq!(metrics.churn_rate, dec!(33.33));
    }

    #[test]
    fn test_other_currencies_are_excluded() {
        let tenant = TenantId::new();
        let mut snapshot = ActivitySnapshot::empty(tenant, day());
        let mut euro = intent(tenant, "pi_eur", 9_000, PaymentStatus::Succeeded, None);
        euro.amount = Money::from_minor(9_000, Currency::EUR);
        snapshot.intents = vec![euro, intent(tenant, "pi_usd", 1_000, PaymentStatus::Succeeded, None)];

        let analytics = PaymentAnalytics::from_snapshot(&snapshot, Currency::USD).unwrap();
        assert_eq!(analytics.total_transactions, 1);
        assert_eq!(analytics.total_revenue, usd(1_000));
    }

    #[tokio::test]
    async fn test_engine_reads_gateway_without_retry() {
        let gateway = Arc::new(MockPaymentGateway::new());
        gateway
            .fail_next(GatewayOperation::ListPaymentIntents, vec![GatewayError::rate_limit()])
            .await;
        let engine = AnalyticsEngine::new(gateway.clone(), Currency::USD);

        let error = engine.get_payment_analytics(TenantId::new(), day()).await.unwrap_err();
        assert!(matches!(
            error,
            ReconciliationError::Gateway(ref e) if e.error_type == PaymentErrorType::RateLimitError
        ));
        assert_eq!(gateway.calls(GatewayOperation::ListPaymentIntents).await, 1);
    }

    #[tokio::test]
    async fn test_engine_returns_zeros_for_idle_tenant() {
        let engine = AnalyticsEngine::new(Arc::new(MockPaymentGateway::new()), Currency::USD);
        let analytics = engine.get_payment_analytics(TenantId::new(), day()).await.unwrap();
        assert_eq!(analytics.total_transactions, 0);
        assert!(analytics.total_revenue.is_zero());
    }
}
