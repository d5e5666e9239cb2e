//! Payments Domain Ports
//!
//! The payment services depend on three ports:
//!
//! - [`PaymentGatewayPort`]: the external payment gateway (payment intents,
//!   refunds, customers, subscriptions, connected accounts, account links).
//!   Failures are raw [`GatewayError`] values so the retry executor can
//!   classify them.
//! - [`PaymentStorePort`]: the tenant/booking store, a keyed read/write store
//!   for tenants, bookings, booking payments and local mirrors of gateway
//!   records.
//! - [`AuditSinkPort`]: fire-and-forget compliance events.
//!
//! # Configuration
//!
//! Adapters are chosen at application startup:
//!
//! ```rust,ignore
//! let store: Arc<dyn PaymentStorePort> = match config.database.url {
//!     Some(url) => Arc::new(PostgresPaymentStore::new(pool)),
//!     None => Arc::new(InMemoryPaymentStore::new()),
//! };
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{
    BookingId, ConnectedAccountId, DomainPort, EventId, GatewayCustomerId, HealthCheckable,
    Money, PaymentIntentId, PortError, PriceId, SubscriptionId, SubscriptionItemId,
    TenantId,
};

use crate::booking::{Booking, BookingPayment};
use crate::connected_account::{AccountLink, ConnectedAccount};
use crate::error::GatewayError;
use crate::events::AuditRecord;
use crate::intent::PaymentIntent;
use crate::refund::{Refund, RefundReason};
use crate::subscription::{GatewayCustomer, Subscription};
use crate::tenant::Tenant;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// Parameters for a new payment intent
#[derive(Debug, Clone)]
pub struct CreateIntentRequest {
    pub tenant_id: TenantId,
    pub amount: Money,
    /// Connected account receiving the transfer
    pub destination: Option<ConnectedAccountId>,
    /// Platform fee retained from the transfer
    pub application_fee: Option<Money>,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: Option<String>,
}

/// Parameters for a refund against a payment intent
#[derive(Debug, Clone)]
pub struct CreateRefundRequest {
    pub tenant_id: TenantId,
    pub payment_intent_id: PaymentIntentId,
    /// Partial amount; the full remaining amount when absent
    pub amount: Option<Money>,
    pub reason: RefundReason,
    pub initiated_by: String,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: Option<String>,
}

/// Parameters for a new gateway customer
#[derive(Debug, Clone)]
pub struct CreateCustomerRequest {
    pub tenant_id: TenantId,
    pub business_name: String,
    pub email: Option<String>,
}

/// Parameters for a new subscription
#[derive(Debug, Clone)]
pub struct CreateSubscriptionRequest {
    pub tenant_id: TenantId,
    pub customer_id: GatewayCustomerId,
    pub price_id: PriceId,
    pub idempotency_key: Option<String>,
}

/// Parameters for a new connected account
#[derive(Debug, Clone)]
pub struct CreateAccountRequest {
    pub tenant_id: TenantId,
    pub business_name: String,
    pub email: Option<String>,
    pub country: String,
    pub business_type: Option<String>,
}

/// Time window and tenant filter for listing gateway records
#[derive(Debug, Clone)]
pub struct GatewayQuery {
    pub tenant_id: TenantId,
    pub created_from: DateTime<Utc>,
    /// Exclusive upper bound
    pub created_before: DateTime<Utc>,
}

impl GatewayQuery {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.created_from && instant < self.created_before
    }
}

/// Port for the external payment gateway
#[async_trait]
pub trait PaymentGatewayPort: DomainPort + HealthCheckable {
    // ========================================================================
    // Payment intents
    // ========================================================================

    async fn create_payment_intent(&self, request: CreateIntentRequest) -> Result<PaymentIntent, GatewayError>;

    async fn retrieve_payment_intent(&self, id: &PaymentIntentId) -> Result<PaymentIntent, GatewayError>;

    async fn confirm_payment_intent(&self, id: &PaymentIntentId) -> Result<PaymentIntent, GatewayError>;

    /// Intents created for the tenant inside the query window
    async fn list_payment_intents(&self, query: &GatewayQuery) -> Result<Vec<PaymentIntent>, GatewayError>;

    // ========================================================================
    // Refunds
    // ========================================================================

    async fn create_refund(&self, request: CreateRefundRequest) -> Result<Refund, GatewayError>;

    /// All refunds issued against one payment intent
    async fn list_refunds_for_payment(&self, payment_intent_id: &PaymentIntentId) -> Result<Vec<Refund>, GatewayError>;

    /// Refunds created for the tenant inside the query window
    async fn list_refunds(&self, query: &GatewayQuery) -> Result<Vec<Refund>, GatewayError>;

    // ========================================================================
    // Customers and subscriptions
    // ========================================================================

    /// Finds the customer tagged with the tenant id in its metadata
    async fn find_customer_by_tenant(&self, tenant_id: TenantId) -> Result<Option<GatewayCustomer>, GatewayError>;

    async fn create_customer(&self, request: CreateCustomerRequest) -> Result<GatewayCustomer, GatewayError>;

    async fn create_subscription(&self, request: CreateSubscriptionRequest) -> Result<Subscription, GatewayError>;

    async fn retrieve_subscription(&self, id: &SubscriptionId) -> Result<Subscription, GatewayError>;

    /// Replaces the price on an existing subscription item
    async fn update_subscription_price(
        &self,
        id: &SubscriptionId,
        item_id: &SubscriptionItemId,
        price_id: &PriceId,
    ) -> Result<Subscription, GatewayError>;

    async fn cancel_subscription(&self, id: &SubscriptionId, at_period_end: bool) -> Result<Subscription, GatewayError>;

    /// Subscriptions belonging to the tenant, in any status
    async fn list_subscriptions(&self, tenant_id: TenantId) -> Result<Vec<Subscription>, GatewayError>;

    // ========================================================================
    // Connected accounts
    // ========================================================================

    async fn create_connected_account(&self, request: CreateAccountRequest) -> Result<ConnectedAccount, GatewayError>;

    async fn retrieve_connected_account(&self, id: &ConnectedAccountId) -> Result<ConnectedAccount, GatewayError>;

    async fn create_account_link(
        &self,
        account_id: &ConnectedAccountId,
        refresh_url: &str,
        return_url: &str,
    ) -> Result<AccountLink, GatewayError>;
}

/// Port for the tenant/booking store
///
/// A keyed store; saves are upserts.
#[async_trait]
pub trait PaymentStorePort: DomainPort + HealthCheckable {
    // ========================================================================
    // Tenants and bookings
    // ========================================================================

    async fn get_tenant(&self, id: TenantId) -> Result<Tenant, PortError>;

    async fn save_tenant(&self, tenant: &Tenant) -> Result<(), PortError>;

    async fn get_booking(&self, id: BookingId) -> Result<Booking, PortError>;

    async fn save_booking(&self, booking: &Booking) -> Result<(), PortError>;

    // ========================================================================
    // Booking payments
    // ========================================================================

    /// Every payment recorded for the booking, oldest first
    async fn list_booking_payments(&self, booking_id: BookingId) -> Result<Vec<BookingPayment>, PortError>;

    async fn find_booking_payment(&self, payment_intent_id: &PaymentIntentId) -> Result<Option<BookingPayment>, PortError>;

    async fn save_booking_payment(&self, payment: &BookingPayment) -> Result<(), PortError>;

    // ========================================================================
    // Local mirrors of gateway records
    // ========================================================================

    async fn find_payment_intent(&self, id: &PaymentIntentId) -> Result<Option<PaymentIntent>, PortError>;

    async fn save_payment_intent(&self, intent: &PaymentIntent) -> Result<(), PortError>;

    /// Locally mirrored intents for the tenant created in `[from, before)`
    async fn list_payment_intents(
        &self,
        tenant_id: TenantId,
        from: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<PaymentIntent>, PortError>;

    async fn save_refund(&self, refund: &Refund) -> Result<(), PortError>;

    async fn list_refunds(&self, payment_intent_id: &PaymentIntentId) -> Result<Vec<Refund>, PortError>;

    async fn find_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>, PortError>;

    async fn save_subscription(&self, subscription: &Subscription) -> Result<(), PortError>;

    // ========================================================================
    // Webhook de-duplication
    // ========================================================================

    async fn is_webhook_event_processed(&self, event_id: &EventId) -> Result<bool, PortError>;

    /// Records a processed event; returns false if it was already recorded
    async fn record_webhook_event(&self, event_id: &EventId, event_type: &str) -> Result<bool, PortError>;
}

/// Extension trait with convenience lookups
#[async_trait]
pub trait PaymentStorePortExt: PaymentStorePort {
    /// Loads a local intent or returns `PortError::NotFound`
    async fn get_payment_intent(&self, id: &PaymentIntentId) -> Result<PaymentIntent, PortError> {
        self.find_payment_intent(id)
            .await?
            .ok_or_else(|| PortError::not_found("PaymentIntent", id))
    }

    /// Looks a tenant up, treating a missing record as `None`
    async fn find_tenant(&self, id: TenantId) -> Result<Option<Tenant>, PortError> {
        match self.get_tenant(id).await {
            Ok(tenant) => Ok(Some(tenant)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl<T: PaymentStorePort + ?Sized> PaymentStorePortExt for T {}

/// Port for the audit/notification sink
#[async_trait]
pub trait AuditSinkPort: DomainPort {
    async fn publish(&self, record: AuditRecord) -> Result<(), PortError>;
}
