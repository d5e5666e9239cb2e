//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use core_kernel::{
    BookingId, ConnectedAccountId, CustomerId, Money, PaymentIntentId, RefundId, TenantId,
};
use domain_payments::intent::{
    METADATA_BOOKING_ID, METADATA_CUSTOMER_ID, METADATA_PAYMENT_TYPE, METADATA_TENANT_ID,
    METADATA_TOTAL_AMOUNT,
};
use domain_payments::webhook::{
    WebhookVerifier, ACCOUNT_UPDATED, CHARGE_REFUNDED, DEFAULT_TOLERANCE, PAYMENT_FAILED,
    PAYMENT_SUCCEEDED,
};
use domain_payments::{PaymentIntent, PaymentStatus, PaymentType, Refund, RefundReason, RefundStatus};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::fixtures::{IdFixtures, MoneyFixtures, StringFixtures};

/// Builder for gateway payment intents
pub struct PaymentIntentBuilder {
    id: PaymentIntentId,
    tenant_id: TenantId,
    amount: Money,
    status: PaymentStatus,
    destination: Option<ConnectedAccountId>,
    application_fee: Option<Money>,
    metadata: HashMap<String, String>,
    created_at: DateTime<Utc>,
}

impl Default for PaymentIntentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentIntentBuilder {
    /// Creates a new builder with default values
    pub fn new() -> Self {
        Self {
            id: PaymentIntentId::new(format!("pi_test_{}", Uuid::new_v4().simple())),
            tenant_id: IdFixtures::tenant_id(),
            amount: MoneyFixtures::booking_total(),
            status: PaymentStatus::Pending,
            destination: Some(IdFixtures::connected_account_id()),
            application_fee: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = PaymentIntentId::new(id);
        self
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_status(mut self, status: PaymentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_application_fee(mut self, fee: Money) -> Self {
        self.application_fee = Some(fee);
        self
    }

    /// Sets the creation instant, e.g. to place the intent in a report period
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// Links the intent to a booking the way the coordinator does
    pub fn for_booking(
        mut self,
        booking_id: BookingId,
        customer_id: CustomerId,
        payment_type: PaymentType,
        total: Money,
    ) -> Self {
        self.metadata.insert(METADATA_BOOKING_ID.to_string(), booking_id.to_string());
        self.metadata.insert(METADATA_CUSTOMER_ID.to_string(), customer_id.to_string());
        self.metadata.insert(METADATA_PAYMENT_TYPE.to_string(), payment_type.to_string());
        self.metadata
            .insert(METADATA_TOTAL_AMOUNT.to_string(), total.minor_units().to_string());
        self
    }

    pub fn build(self) -> PaymentIntent {
        let mut metadata = self.metadata;
        metadata.insert(METADATA_TENANT_ID.to_string(), self.tenant_id.to_string());
        PaymentIntent {
            client_secret: Some(format!("{}_secret", self.id)),
            id: self.id,
            tenant_id: self.tenant_id,
            amount: self.amount,
            status: self.status,
            destination: self.destination,
            application_fee: self.application_fee,
            metadata,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// Builder for gateway refunds
pub struct RefundBuilder {
    payment_intent_id: PaymentIntentId,
    tenant_id: TenantId,
    amount: Money,
    status: RefundStatus,
    created_at: DateTime<Utc>,
}

impl RefundBuilder {
    /// A succeeded refund of `amount` against `payment`
    pub fn new(payment: &PaymentIntent, amount: Money) -> Self {
        Self {
            payment_intent_id: payment.id.clone(),
            tenant_id: payment.tenant_id,
            amount,
            status: RefundStatus::Succeeded,
            created_at: payment.created_at,
        }
    }

    pub fn with_status(mut self, status: RefundStatus) -> Self {
        self.status = status;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn build(self) -> Refund {
        Refund {
            id: RefundId::new(format!("re_test_{}", Uuid::new_v4().simple())),
            payment_intent_id: self.payment_intent_id,
            tenant_id: self.tenant_id,
            amount: self.amount,
            status: self.status,
            reason: Some(RefundReason::RequestedByCustomer),
            initiated_by: Some(StringFixtures::staff_user().to_string()),
            metadata: HashMap::new(),
            created_at: self.created_at,
        }
    }
}

/// A webhook body and the signature header that goes with it
#[derive(Debug, Clone)]
pub struct SignedWebhook {
    pub payload: Vec<u8>,
    pub signature: String,
}

/// Builder for gateway webhook events
pub struct WebhookEventBuilder {
    id: String,
    event_type: String,
    object: Value,
    timestamp: i64,
}

impl WebhookEventBuilder {
    pub fn new(event_type: impl Into<String>, object: Value) -> Self {
        Self {
            id: format!("evt_test_{}", Uuid::new_v4().simple()),
            event_type: event_type.into(),
            object,
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn payment_succeeded(id: &PaymentIntentId) -> Self {
        Self::new(PAYMENT_SUCCEEDED, json!({ "id": id, "object": "payment_intent" }))
    }

    pub fn payment_failed(id: &PaymentIntentId) -> Self {
        Self::new(PAYMENT_FAILED, json!({ "id": id, "object": "payment_intent" }))
    }

    pub fn charge_refunded(id: &PaymentIntentId) -> Self {
        Self::new(
            CHARGE_REFUNDED,
            json!({ "id": "ch_test", "object": "charge", "payment_intent": id, "refunded": true }),
        )
    }

    pub fn account_updated(account_id: &ConnectedAccountId, tenant_id: TenantId, complete: bool) -> Self {
        let due: Vec<&str> = if complete { vec![] } else { vec!["external_account"] };
        Self::new(
            ACCOUNT_UPDATED,
            json!({
                "id": account_id,
                "object": "account",
                "metadata": { "tenant_id": tenant_id.to_string() },
                "charges_enabled": complete,
                "payouts_enabled": complete,
                "details_submitted": complete,
                "requirements": { "currently_due": due }
            }),
        )
    }

    /// Fixes the event id, e.g. to replay one delivery
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Unix time used for `created` and the signature
    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "object": "event",
            "type": self.event_type,
            "created": self.timestamp,
            "data": { "object": self.object }
        })
    }

    /// Signs with the shared test secret
    pub fn signed(self) -> SignedWebhook {
        self.signed_with(StringFixtures::webhook_secret())
    }

    pub fn signed_with(self, secret: &str) -> SignedWebhook {
        let payload = serde_json::to_vec(&self.to_json()).expect("event serializes");
        let signature = WebhookVerifier::new(secret, DEFAULT_TOLERANCE)
            .sign(&payload, self.timestamp)
            .expect("test secret is set");
        SignedWebhook { payload, signature }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_builder_links_booking() {
        let booking = IdFixtures::booking_id();
        let intent = PaymentIntentBuilder::new()
            .for_booking(booking, IdFixtures::customer_id(), PaymentType::Deposit, MoneyFixtures::booking_total())
            .with_amount(MoneyFixtures::deposit())
            .build();

        assert_eq!(intent.booking_id(), Some(booking));
        assert_eq!(intent.tenant_id, IdFixtures::tenant_id());
        assert_eq!(intent.status, PaymentStatus::Pending);
    }

    #[test]
    fn test_signed_webhook_verifies() {
        let signed = WebhookEventBuilder::payment_succeeded(&PaymentIntentId::new("pi_1")).signed();
        let verifier = WebhookVerifier::new(StringFixtures::webhook_secret(), DEFAULT_TOLERANCE);
        assert!(verifier.verify(&signed.payload, &signed.signature).is_ok());
    }

    #[test]
    fn test_event_json_shape() {
        let event = WebhookEventBuilder::payment_failed(&PaymentIntentId::new("pi_2"))
            .with_id("evt_fixed")
            .to_json();
        assert_eq!(event["id"], "evt_fixed");
        assert_eq!(event["type"], "payment_intent.payment_failed");
        assert_eq!(event["data"]["object"]["id"], "pi_2");
    }
}
