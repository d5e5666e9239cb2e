//! Mock adapters for testing
//!
//! [`MockPaymentGateway`] keeps gateway records in memory and behaves like a
//! well-mannered gateway: idempotency keys return the original intent or
//! subscription,
//! refunds reduce the refundable balance and full refunds mark the intent
//! refunded. Failures can be queued per operation with
//! [`MockPaymentGateway::fail_next`], and every call is counted.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use core_kernel::{
    AdapterHealth, ConnectedAccountId, DomainPort, GatewayCustomerId, HealthCheckResult,
    HealthCheckable, Money, PaymentIntentId, PortError, PriceId, RefundId, SubscriptionId,
    SubscriptionItemId, TenantId,
};

use super::{
    AuditSinkPort, CreateAccountRequest, CreateCustomerRequest, CreateIntentRequest,
    CreateRefundRequest, CreateSubscriptionRequest, GatewayQuery, PaymentGatewayPort,
};
use crate::connected_account::{AccountLink, ConnectedAccount};
use crate::error::GatewayError;
use crate::events::AuditRecord;
use crate::intent::{PaymentIntent, PaymentStatus};
use crate::refund::{Refund, RefundStatus};
use crate::subscription::{BillingInterval, GatewayCustomer, Subscription, SubscriptionStatus};

/// Gateway operations that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOperation {
    CreatePaymentIntent,
    RetrievePaymentIntent,
    ConfirmPaymentIntent,
    ListPaymentIntents,
    CreateRefund,
    ListRefunds,
    FindCustomer,
    CreateCustomer,
    CreateSubscription,
    RetrieveSubscription,
    UpdateSubscription,
    CancelSubscription,
    ListSubscriptions,
    CreateConnectedAccount,
    RetrieveConnectedAccount,
    CreateAccountLink,
}

#[derive(Debug, Default)]
struct GatewayState {
    sequence: u64,
    intents: HashMap<PaymentIntentId, PaymentIntent>,
    idempotency: HashMap<String, PaymentIntentId>,
    refunds: Vec<Refund>,
    customers: HashMap<GatewayCustomerId, GatewayCustomer>,
    prices: HashMap<PriceId, (Money, BillingInterval)>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    subscription_keys: HashMap<String, SubscriptionId>,
    accounts: HashMap<ConnectedAccountId, ConnectedAccount>,
    failures: HashMap<GatewayOperation, VecDeque<GatewayError>>,
    calls: HashMap<GatewayOperation, u32>,
}

impl GatewayState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{}_mock_{}", prefix, self.sequence)
    }

    fn refunded_amount(&self, id: &PaymentIntentId) -> i64 {
        self.refunds
            .iter()
            .filter(|r| &r.payment_intent_id == id && r.status.holds_funds())
            .map(|r| r.amount.minor_units())
            .sum()
    }
}

/// In-memory payment gateway
#[derive(Debug, Default)]
pub struct MockPaymentGateway {
    state: Mutex<GatewayState>,
    latency: Option<Duration>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call, for exercising per-call timeouts
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the next calls of `operation` fail with `errors`, in order
    pub async fn fail_next(&self, operation: GatewayOperation, errors: Vec<GatewayError>) {
        self.state
            .lock()
            .await
            .failures
            .entry(operation)
            .or_default()
            .extend(errors);
    }

    /// Number of times `operation` has been invoked
    pub async fn calls(&self, operation: GatewayOperation) -> u32 {
        self.state.lock().await.calls.get(&operation).copied().unwrap_or(0)
    }

    /// Registers a price that subscriptions can use
    pub async fn add_price(&self, price_id: PriceId, unit_amount: Money, interval: BillingInterval) {
        self.state.lock().await.prices.insert(price_id, (unit_amount, interval));
    }

    pub async fn insert_intent(&self, intent: PaymentIntent) {
        self.state.lock().await.intents.insert(intent.id.clone(), intent);
    }

    pub async fn insert_refund(&self, refund: Refund) {
        self.state.lock().await.refunds.push(refund);
    }

    pub async fn insert_subscription(&self, subscription: Subscription) {
        self.state
            .lock()
            .await
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    pub async fn insert_account(&self, account: ConnectedAccount) {
        self.state.lock().await.accounts.insert(account.id.clone(), account);
    }

    /// Changes the gateway-side status of an intent
    pub async fn set_intent_status(&self, id: &PaymentIntentId, status: PaymentStatus) {
        if let Some(intent) = self.state.lock().await.intents.get_mut(id) {
            intent.status = status;
            intent.updated_at = Utc::now();
        }
    }

    /// Changes the capability flags of a connected account
    pub async fn set_account_flags(
        &self,
        id: &ConnectedAccountId,
        charges_enabled: bool,
        payouts_enabled: bool,
        details_submitted: bool,
        requirements_due: Vec<String>,
    ) {
        if let Some(account) = self.state.lock().await.accounts.get_mut(id) {
            account.charges_enabled = charges_enabled;
            account.payouts_enabled = payouts_enabled;
            account.details_submitted = details_submitted;
            account.requirements_due = requirements_due;
        }
    }

    pub async fn intent(&self, id: &PaymentIntentId) -> Option<PaymentIntent> {
        self.state.lock().await.intents.get(id).cloned()
    }

    pub async fn refunds(&self) -> Vec<Refund> {
        self.state.lock().await.refunds.clone()
    }

    /// Counts the call and pops a scripted failure, if any
    async fn begin(&self, operation: GatewayOperation) -> Result<(), GatewayError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state.lock().await;
        *state.calls.entry(operation).or_default() += 1;
        match state.failures.get_mut(&operation).and_then(|queue| queue.pop_front()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl DomainPort for MockPaymentGateway {}

#[async_trait]
impl HealthCheckable for MockPaymentGateway {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            adapter_id: "mock-payment-gateway".to_string(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: Some("Mock adapter always healthy".to_string()),
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl PaymentGatewayPort for MockPaymentGateway {
    async fn create_payment_intent(&self, request: CreateIntentRequest) -> Result<PaymentIntent, GatewayError> {
        self.begin(GatewayOperation::CreatePaymentIntent).await?;
        let mut state = self.state.lock().await;

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = state.idempotency.get(key).and_then(|id| state.intents.get(id)) {
                return Ok(existing.clone());
            }
        }
        if !request.amount.is_positive() {
            return Err(GatewayError::InvalidRequest {
                code: Some("amount_too_small".to_string()),
                param: Some("amount".to_string()),
                message: "Amount must be at least 1".to_string(),
            });
        }

        let id = PaymentIntentId::new(state.next_id("pi"));
        let now = Utc::now();
        let intent = PaymentIntent {
            client_secret: Some(format!("{}_secret", id)),
            id: id.clone(),
            tenant_id: request.tenant_id,
            amount: request.amount,
            status: PaymentStatus::Pending,
            destination: request.destination,
            application_fee: request.application_fee,
            metadata: request.metadata,
            created_at: now,
            updated_at: now,
        };
        if let Some(key) = request.idempotency_key {
            state.idempotency.insert(key, id.clone());
        }
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_payment_intent(&self, id: &PaymentIntentId) -> Result<PaymentIntent, GatewayError> {
        self.begin(GatewayOperation::RetrievePaymentIntent).await?;
        self.state
            .lock()
            .await
            .intents
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found("payment_intent", id))
    }

    async fn confirm_payment_intent(&self, id: &PaymentIntentId) -> Result<PaymentIntent, GatewayError> {
        self.begin(GatewayOperation::ConfirmPaymentIntent).await?;
        let mut state = self.state.lock().await;
        let intent = state
            .intents
            .get_mut(id)
            .ok_or_else(|| GatewayError::not_found("payment_intent", id))?;
        if intent.status == PaymentStatus::Pending {
            intent.status = PaymentStatus::Succeeded;
            intent.updated_at = Utc::now();
        }
        Ok(intent.clone())
    }

    async fn list_payment_intents(&self, query: &GatewayQuery) -> Result<Vec<PaymentIntent>, GatewayError> {
        self.begin(GatewayOperation::ListPaymentIntents).await?;
        let state = self.state.lock().await;
        let mut intents: Vec<_> = state
            .intents
            .values()
            .filter(|i| i.tenant_id == query.tenant_id && query.contains(i.created_at))
            .cloned()
            .collect();
        intents.sort_by_key(|i| i.created_at);
        Ok(intents)
    }

    async fn create_refund(&self, request: CreateRefundRequest) -> Result<Refund, GatewayError> {
        self.begin(GatewayOperation::CreateRefund).await?;
        let mut state = self.state.lock().await;

        let intent = state
            .intents
            .get(&request.payment_intent_id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found("payment_intent", &request.payment_intent_id))?;
        let remaining = intent.amount.minor_units() - state.refunded_amount(&intent.id);
        let amount = request.amount.map_or(remaining, |a| a.minor_units());
        if intent.status != PaymentStatus::Succeeded || amount > remaining || amount <= 0 {
            return Err(GatewayError::InvalidRequest {
                code: Some("charge_already_refunded".to_string()),
                param: Some("amount".to_string()),
                message: "Refund amount exceeds the refundable balance".to_string(),
            });
        }

        let refund = Refund {
            id: RefundId::new(state.next_id("re")),
            payment_intent_id: intent.id.clone(),
            tenant_id: intent.tenant_id,
            amount: Money::from_minor(amount, intent.amount.currency()),
            status: RefundStatus::Succeeded,
            reason: Some(request.reason),
            initiated_by: Some(request.initiated_by),
            metadata: request.metadata,
            created_at: Utc::now(),
        };
        state.refunds.push(refund.clone());

        if amount == remaining {
            if let Some(stored) = state.intents.get_mut(&intent.id) {
                stored.status = PaymentStatus::Refunded;
                stored.updated_at = Utc::now();
            }
        }
        Ok(refund)
    }

    async fn list_refunds_for_payment(&self, payment_intent_id: &PaymentIntentId) -> Result<Vec<Refund>, GatewayError> {
        self.begin(GatewayOperation::ListRefunds).await?;
        Ok(self
            .state
            .lock()
            .await
            .refunds
            .iter()
            .filter(|r| &r.payment_intent_id == payment_intent_id)
            .cloned()
            .collect())
    }

    async fn list_refunds(&self, query: &GatewayQuery) -> Result<Vec<Refund>, GatewayError> {
        self.begin(GatewayOperation::ListRefunds).await?;
        Ok(self
            .state
            .lock()
            .await
            .refunds
            .iter()
            .filter(|r| r.tenant_id == query.tenant_id && query.contains(r.created_at))
            .cloned()
            .collect())
    }

    async fn find_customer_by_tenant(&self, tenant_id: TenantId) -> Result<Option<GatewayCustomer>, GatewayError> {
        self.begin(GatewayOperation::FindCustomer).await?;
        Ok(self
            .state
            .lock()
            .await
            .customers
            .values()
            .find(|c| c.tenant_id == Some(tenant_id))
            .cloned())
    }

    async fn create_customer(&self, request: CreateCustomerRequest) -> Result<GatewayCustomer, GatewayError> {
        self.begin(GatewayOperation::CreateCustomer).await?;
        let mut state = self.state.lock().await;
        let customer = GatewayCustomer {
            id: GatewayCustomerId::new(state.next_id("cus")),
            tenant_id: Some(request.tenant_id),
            business_name: Some(request.business_name),
            email: request.email,
        };
        state.customers.insert(customer.id.clone(), customer.clone());
        Ok(customer)
    }

    async fn create_subscription(&self, request: CreateSubscriptionRequest) -> Result<Subscription, GatewayError> {
        self.begin(GatewayOperation::CreateSubscription).await?;
        let mut state = self.state.lock().await;

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = state.subscription_keys.get(key).and_then(|id| state.subscriptions.get(id)) {
                return Ok(existing.clone());
            }
        }
        let (unit_amount, interval) = state
            .prices
            .get(&request.price_id)
            .copied()
            .ok_or_else(|| GatewayError::not_found("price", &request.price_id))?;

        let id = SubscriptionId::new(state.next_id("sub"));
        let item_id = SubscriptionItemId::new(state.next_id("si"));
        let now = Utc::now();
        let subscription = Subscription {
            client_secret: Some(format!("{}_secret", id)),
            id: id.clone(),
            tenant_id: request.tenant_id,
            customer_id: request.customer_id,
            item_id,
            plan_id: request.price_id,
            status: SubscriptionStatus::Active,
            unit_amount,
            interval,
            current_period_start: now,
            current_period_end: period_end(now, interval),
            cancel_at_period_end: false,
            canceled_at: None,
            created_at: now,
        };
        if let Some(key) = request.idempotency_key {
            state.subscription_keys.insert(key, id.clone());
        }
        state.subscriptions.insert(id, subscription.clone());
        Ok(subscription)
    }

    async fn retrieve_subscription(&self, id: &SubscriptionId) -> Result<Subscription, GatewayError> {
        self.begin(GatewayOperation::RetrieveSubscription).await?;
        self.state
            .lock()
            .await
            .subscriptions
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found("subscription", id))
    }

    async fn update_subscription_price(
        &self,
        id: &SubscriptionId,
        item_id: &SubscriptionItemId,
        price_id: &PriceId,
    ) -> Result<Subscription, GatewayError> {
        self.begin(GatewayOperation::UpdateSubscription).await?;
        let mut state = self.state.lock().await;
        let (unit_amount, interval) = state
            .prices
            .get(price_id)
            .copied()
            .ok_or_else(|| GatewayError::not_found("price", price_id))?;
        let subscription = state
            .subscriptions
            .get_mut(id)
            .ok_or_else(|| GatewayError::not_found("subscription", id))?;
        if &subscription.item_id != item_id {
            return Err(GatewayError::not_found("subscription_item", item_id));
        }
        subscription.plan_id = price_id.clone();
        subscription.unit_amount = unit_amount;
        subscription.interval = interval;
        Ok(subscription.clone())
    }

    async fn cancel_subscription(&self, id: &SubscriptionId, at_period_end: bool) -> Result<Subscription, GatewayError> {
        self.begin(GatewayOperation::CancelSubscription).await?;
        let mut state = self.state.lock().await;
        let subscription = state
            .subscriptions
            .get_mut(id)
            .ok_or_else(|| GatewayError::not_found("subscription", id))?;
        if at_period_end {
            subscription.cancel_at_period_end = true;
        } else {
            subscription.status = SubscriptionStatus::Canceled;
            subscription.canceled_at = Some(Utc::now());
        }
        Ok(subscription.clone())
    }

    async fn list_subscriptions(&self, tenant_id: TenantId) -> Result<Vec<Subscription>, GatewayError> {
        self.begin(GatewayOperation::ListSubscriptions).await?;
        Ok(self
            .state
            .lock()
            .await
            .subscriptions
            .values()
            .filter(|s| s.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn create_connected_account(&self, request: CreateAccountRequest) -> Result<ConnectedAccount, GatewayError> {
        self.begin(GatewayOperation::CreateConnectedAccount).await?;
        let mut state = self.state.lock().await;
        let account = ConnectedAccount {
            id: ConnectedAccountId::new(state.next_id("acct")),
            tenant_id: Some(request.tenant_id),
            charges_enabled: false,
            payouts_enabled: false,
            details_submitted: false,
            requirements_due: vec!["external_account".to_string(), "tos_acceptance.date".to_string()],
            created_at: Some(Utc::now()),
        };
        state.accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    async fn retrieve_connected_account(&self, id: &ConnectedAccountId) -> Result<ConnectedAccount, GatewayError> {
        self.begin(GatewayOperation::RetrieveConnectedAccount).await?;
        self.state
            .lock()
            .await
            .accounts
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::not_found("account", id))
    }

    async fn create_account_link(
        &self,
        account_id: &ConnectedAccountId,
        _refresh_url: &str,
        _return_url: &str,
    ) -> Result<AccountLink, GatewayError> {
        self.begin(GatewayOperation::CreateAccountLink).await?;
        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(account_id) {
            return Err(GatewayError::not_found("account", account_id));
        }
        let token = state.next_id("link");
        Ok(AccountLink {
            url: format!("https://connect.mock.test/setup/{}/{}", account_id, token),
            expires_at: Some(Utc::now() + chrono::Duration::minutes(5)),
        })
    }
}

fn period_end(start: DateTime<Utc>, interval: BillingInterval) -> DateTime<Utc> {
    match interval {
        BillingInterval::Day => start + chrono::Duration::days(1),
        BillingInterval::Week => start + chrono::Duration::weeks(1),
        BillingInterval::Month => start + chrono::Duration::days(30),
        BillingInterval::Year => start + chrono::Duration::days(365),
    }
}

/// Audit sink that keeps every record in memory
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
    failing: bool,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every publish fails
    pub fn failing() -> Self {
        Self {
            records: Mutex::default(),
            failing: true,
        }
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }

    /// Names of the recorded events, in publish order
    pub async fn event_names(&self) -> Vec<&'static str> {
        self.records.lock().await.iter().map(|r| r.event.name()).collect()
    }

    pub async fn count(&self, name: &str) -> usize {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.event.name() == name)
            .count()
    }
}

impl DomainPort for RecordingAuditSink {}

#[async_trait]
impl AuditSinkPort for RecordingAuditSink {
    async fn publish(&self, record: AuditRecord) -> Result<(), PortError> {
        if self.failing {
            return Err(PortError::unavailable("audit sink unavailable"));
        }
        self.records.lock().await.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;

    fn intent_request(key: Option<&str>) -> CreateIntentRequest {
        CreateIntentRequest {
            tenant_id: TenantId::new(),
            amount: Money::from_minor(5000, Currency::USD),
            destination: None,
            application_fee: None,
            metadata: HashMap::new(),
            idempotency_key: key.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let gateway = MockPaymentGateway::new();
        gateway
            .fail_next(GatewayOperation::CreatePaymentIntent, vec![GatewayError::rate_limit()])
            .await;

        assert!(gateway.create_payment_intent(intent_request(None)).await.is_err());
        assert!(gateway.create_payment_intent(intent_request(None)).await.is_ok());
        assert_eq!(gateway.calls(GatewayOperation::CreatePaymentIntent).await, 2);
    }

    #[tokio::test]
    async fn test_idempotency_key_returns_original_intent() {
        let gateway = MockPaymentGateway::new();
        let first = gateway.create_payment_intent(intent_request(Some("k1"))).await.unwrap();
        let second = gateway.create_payment_intent(intent_request(Some("k1"))).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_full_refund_marks_intent_refunded() {
        let gateway = MockPaymentGateway::new();
        let intent = gateway.create_payment_intent(intent_request(None)).await.unwrap();
        gateway.confirm_payment_intent(&intent.id).await.unwrap();

        gateway
            .create_refund(CreateRefundRequest {
                tenant_id: intent.tenant_id,
                payment_intent_id: intent.id.clone(),
                amount: None,
                reason: Default::default(),
                initiated_by: "ops".to_string(),
                metadata: HashMap::new(),
                idempotency_key: None,
            })
            .await
            .unwrap();

        assert_eq!(gateway.intent(&intent.id).await.unwrap().status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn test_failing_audit_sink() {
        let sink = RecordingAuditSink::failing();
        let record = AuditRecord::new(crate::events::PaymentEvent::WebhookProcessed {
            event_id: core_kernel::EventId::new("evt_1"),
            webhook_type: "ping".to_string(),
            handlers: vec![],
            duplicate: false,
        });
        assert!(sink.publish(record).await.is_err());
        assert!(sink.records().await.is_empty());
    }
}
