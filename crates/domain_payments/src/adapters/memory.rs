//! In-memory store adapter
//!
//! Holds tenants, bookings, booking payments and mirrored gateway records in
//! process memory. Suitable for single-process deployments and tests; data
//! is lost on restart.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use core_kernel::{
    BookingId, DomainPort, EventId, HealthCheckResult, HealthCheckable, PaymentIntentId, PortError,
    SubscriptionId, TenantId,
};

use crate::booking::{Booking, BookingPayment};
use crate::intent::PaymentIntent;
use crate::ports::PaymentStorePort;
use crate::refund::Refund;
use crate::subscription::Subscription;
use crate::tenant::Tenant;

/// Store adapter backed by hash maps
#[derive(Debug, Default)]
pub struct InMemoryPaymentStore {
    tenants: RwLock<HashMap<TenantId, Tenant>>,
    bookings: RwLock<HashMap<BookingId, Booking>>,
    booking_payments: RwLock<Vec<BookingPayment>>,
    intents: RwLock<HashMap<PaymentIntentId, PaymentIntent>>,
    refunds: RwLock<Vec<Refund>>,
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    webhook_events: RwLock<HashSet<EventId>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates the store with tenants
    pub async fn with_tenants(tenants: Vec<Tenant>) -> Self {
        let store = Self::new();
        {
            let mut map = store.tenants.write().await;
            for tenant in tenants {
                map.insert(tenant.id, tenant);
            }
        }
        store
    }

    pub async fn booking_payment_count(&self) -> usize {
        self.booking_payments.read().await.len()
    }
}

impl DomainPort for InMemoryPaymentStore {}

#[async_trait]
impl HealthCheckable for InMemoryPaymentStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("in-memory-payment-store")
    }
}

#[async_trait]
impl PaymentStorePort for InMemoryPaymentStore {
    async fn get_tenant(&self, id: TenantId) -> Result<Tenant, PortError> {
        self.tenants
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Tenant", id))
    }

    async fn save_tenant(&self, tenant: &Tenant) -> Result<(), PortError> {
        self.tenants.write().await.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn get_booking(&self, id: BookingId) -> Result<Booking, PortError> {
        self.bookings
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::not_found("Booking", id))
    }

    async fn save_booking(&self, booking: &Booking) -> Result<(), PortError> {
        self.bookings.write().await.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn list_booking_payments(&self, booking_id: BookingId) -> Result<Vec<BookingPayment>, PortError> {
        let mut payments: Vec<_> = self
            .booking_payments
            .read()
            .await
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn find_booking_payment(&self, payment_intent_id: &PaymentIntentId) -> Result<Option<BookingPayment>, PortError> {
        Ok(self
            .booking_payments
            .read()
            .await
            .iter()
            .find(|p| &p.payment_intent_id == payment_intent_id)
            .cloned())
    }

    async fn save_booking_payment(&self, payment: &BookingPayment) -> Result<(), PortError> {
        let mut payments = self.booking_payments.write().await;
        match payments
            .iter_mut()
            .find(|p| p.payment_intent_id == payment.payment_intent_id)
        {
            Some(existing) => *existing = payment.clone(),
            None => payments.push(payment.clone()),
        }
        Ok(())
    }

    async fn find_payment_intent(&self, id: &PaymentIntentId) -> Result<Option<PaymentIntent>, PortError> {
        Ok(self.intents.read().await.get(id).cloned())
    }

    async fn save_payment_intent(&self, intent: &PaymentIntent) -> Result<(), PortError> {
        self.intents.write().await.insert(intent.id.clone(), intent.clone());
        Ok(())
    }

    async fn list_payment_intents(
        &self,
        tenant_id: TenantId,
        from: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<PaymentIntent>, PortError> {
        let mut intents: Vec<_> = self
            .intents
            .read()
            .await
            .values()
            .filter(|i| i.tenant_id == tenant_id && i.created_at >= from && i.created_at < before)
            .cloned()
            .collect();
        intents.sort_by_key(|i| i.created_at);
        Ok(intents)
    }

    async fn save_refund(&self, refund: &Refund) -> Result<(), PortError> {
        let mut refunds = self.refunds.write().await;
        match refunds.iter_mut().find(|r| r.id == refund.id) {
            Some(existing) => *existing = refund.clone(),
            None => refunds.push(refund.clone()),
        }
        Ok(())
    }

    async fn list_refunds(&self, payment_intent_id: &PaymentIntentId) -> Result<Vec<Refund>, PortError> {
        Ok(self
            .refunds
            .read()
            .await
            .iter()
            .filter(|r| &r.payment_intent_id == payment_intent_id)
            .cloned()
            .collect())
    }

    async fn find_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>, PortError> {
        Ok(self.subscriptions.read().await.get(id).cloned())
    }

    async fn save_subscription(&self, subscription: &Subscription) -> Result<(), PortError> {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id.clone(), subscription.clone());
        Ok(())
    }

    async fn is_webhook_event_processed(&self, event_id: &EventId) -> Result<bool, PortError> {
        Ok(self.webhook_events.read().await.contains(event_id))
    }

    async fn record_webhook_event(&self, event_id: &EventId, _event_type: &str) -> Result<bool, PortError> {
        Ok(self.webhook_events.write().await.insert(event_id.clone()))
    }
}
