//! PostgreSQL payments store adapter
//!
//! Implements [`PaymentStorePort`] on top of [`PaymentRepository`], mapping
//! between domain records and row types.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{
    AdapterHealth, BookingId, ConnectedAccountId, Currency, CustomerId, DomainPort, EventId,
    GatewayCustomerId, HealthCheckResult, HealthCheckable, Money, PaymentIntentId, PortError,
    PriceId, RefundId, SubscriptionId, SubscriptionItemId, TenantId,
};
use domain_payments::ports::PaymentStorePort;
use domain_payments::{Booking, BookingPayment, PaymentIntent, Refund, Subscription, Tenant};

use crate::error::DatabaseError;
use crate::repositories::payments::{
    BookingPaymentRow, BookingRow, PaymentIntentRow, PaymentRepository, RefundRow, SubscriptionRow,
    TenantRow,
};

const ADAPTER_ID: &str = "postgres-payment-store";

/// Store adapter backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PostgresPaymentStore {
    repository: PaymentRepository,
}

impl PostgresPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: PaymentRepository::new(pool),
        }
    }
}

// ============================================================================
// Column conversions
// ============================================================================

/// Text form of a snake_case serde enum
fn enum_to_text<T: Serialize>(value: &T, column: &'static str) -> Result<String, DatabaseError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(text)) => Ok(text),
        Ok(other) => Err(DatabaseError::invalid_value(column, other.to_string())),
        Err(e) => Err(DatabaseError::invalid_value(column, e.to_string())),
    }
}

fn enum_from_text<T: DeserializeOwned>(text: &str, column: &'static str) -> Result<T, DatabaseError> {
    serde_json::from_value(serde_json::Value::String(text.to_string()))
        .map_err(|_| DatabaseError::invalid_value(column, text))
}

fn currency(code: &str) -> Result<Currency, DatabaseError> {
    Currency::from_str(code).map_err(|_| DatabaseError::invalid_value("currency", code))
}

fn money(minor: i64, code: &str) -> Result<Money, DatabaseError> {
    Ok(Money::from_minor(minor, currency(code)?))
}

fn tenant_from_row(row: TenantRow) -> Tenant {
    Tenant {
        id: TenantId::from_uuid(row.tenant_id),
        business_name: row.business_name,
        email: row.email,
        connected_account_id: row.connected_account_id.map(ConnectedAccountId::new),
        gateway_customer_id: row.gateway_customer_id.map(GatewayCustomerId::new),
        subscription_id: row.subscription_id.map(SubscriptionId::new),
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn tenant_to_row(tenant: &Tenant) -> TenantRow {
    TenantRow {
        tenant_id: *tenant.id.as_uuid(),
        business_name: tenant.business_name.clone(),
        email: tenant.email.clone(),
        connected_account_id: tenant.connected_account_id.as_ref().map(|id| id.as_str().to_string()),
        gateway_customer_id: tenant.gateway_customer_id.as_ref().map(|id| id.as_str().to_string()),
        subscription_id: tenant.subscription_id.as_ref().map(|id| id.as_str().to_string()),
        created_at: tenant.created_at,
        updated_at: tenant.updated_at,
    }
}

fn booking_from_row(row: BookingRow) -> Result<Booking, DatabaseError> {
    Ok(Booking {
        id: BookingId::from_uuid(row.booking_id),
        tenant_id: TenantId::from_uuid(row.tenant_id),
        customer_id: CustomerId::from_uuid(row.customer_id),
        total_amount: money(row.total_minor, &row.currency)?,
        created_at: row.created_at,
    })
}

fn booking_payment_from_row(row: BookingPaymentRow) -> Result<BookingPayment, DatabaseError> {
    let currency = currency(&row.currency)?;
    Ok(BookingPayment {
        payment_intent_id: PaymentIntentId::new(row.payment_intent_id),
        booking_id: BookingId::from_uuid(row.booking_id),
        customer_id: CustomerId::from_uuid(row.customer_id),
        tenant_id: TenantId::from_uuid(row.tenant_id),
        payment_type: enum_from_text(&row.payment_type, "payment_type")?,
        amount: Money::from_minor(row.amount_minor, currency),
        total_amount: Money::from_minor(row.total_minor, currency),
        application_fee: Money::from_minor(row.application_fee_minor, currency),
        status: enum_from_text(&row.status, "status")?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn booking_payment_to_row(payment: &BookingPayment) -> Result<BookingPaymentRow, DatabaseError> {
    Ok(BookingPaymentRow {
        payment_intent_id: payment.payment_intent_id.as_str().to_string(),
        booking_id: *payment.booking_id.as_uuid(),
        customer_id: *payment.customer_id.as_uuid(),
        tenant_id: *payment.tenant_id.as_uuid(),
        payment_type: enum_to_text(&payment.payment_type, "payment_type")?,
        amount_minor: payment.amount.minor_units(),
        total_minor: payment.total_amount.minor_units(),
        application_fee_minor: payment.application_fee.minor_units(),
        currency: payment.amount.currency().code().to_string(),
        status: enum_to_text(&payment.status, "status")?,
        created_at: payment.created_at,
        updated_at: payment.updated_at,
    })
}

fn intent_from_row(row: PaymentIntentRow) -> Result<PaymentIntent, DatabaseError> {
    let currency = currency(&row.currency)?;
    Ok(PaymentIntent {
        id: PaymentIntentId::new(row.payment_intent_id),
        tenant_id: TenantId::from_uuid(row.tenant_id),
        amount: Money::from_minor(row.amount_minor, currency),
        status: enum_from_text(&row.status, "status")?,
        destination: row.destination.map(ConnectedAccountId::new),
        application_fee: row.application_fee_minor.map(|fee| Money::from_minor(fee, currency)),
        metadata: row.metadata.0,
        client_secret: row.client_secret,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn intent_to_row(intent: &PaymentIntent) -> Result<PaymentIntentRow, DatabaseError> {
    Ok(PaymentIntentRow {
        payment_intent_id: intent.id.as_str().to_string(),
        tenant_id: *intent.tenant_id.as_uuid(),
        amount_minor: intent.amount.minor_units(),
        currency: intent.amount.currency().code().to_string(),
        status: enum_to_text(&intent.status, "status")?,
        destination: intent.destination.as_ref().map(|d| d.as_str().to_string()),
        application_fee_minor: intent.application_fee.as_ref().map(Money::minor_units),
        metadata: Json(intent.metadata.clone()),
        client_secret: intent.client_secret.clone(),
        created_at: intent.created_at,
        updated_at: intent.updated_at,
    })
}

fn refund_from_row(row: RefundRow) -> Result<Refund, DatabaseError> {
    Ok(Refund {
        id: RefundId::new(row.refund_id),
        payment_intent_id: PaymentIntentId::new(row.payment_intent_id),
        tenant_id: TenantId::from_uuid(row.tenant_id),
        amount: money(row.amount_minor, &row.currency)?,
        status: enum_from_text(&row.status, "status")?,
        reason: row
            .reason
            .as_deref()
            .map(|reason| enum_from_text(reason, "reason"))
            .transpose()?,
        initiated_by: row.initiated_by,
        metadata: row.metadata.0,
        created_at: row.created_at,
    })
}

fn refund_to_row(refund: &Refund) -> Result<RefundRow, DatabaseError> {
    Ok(RefundRow {
        refund_id: refund.id.as_str().to_string(),
        payment_intent_id: refund.payment_intent_id.as_str().to_string(),
        tenant_id: *refund.tenant_id.as_uuid(),
        amount_minor: refund.amount.minor_units(),
        currency: refund.amount.currency().code().to_string(),
        status: enum_to_text(&refund.status, "status")?,
        reason: refund
            .reason
            .as_ref()
            .map(|reason| enum_to_text(reason, "reason"))
            .transpose()?,
        initiated_by: refund.initiated_by.clone(),
        metadata: Json(refund.metadata.clone()),
        created_at: refund.created_at,
    })
}

fn subscription_from_row(row: SubscriptionRow) -> Result<Subscription, DatabaseError> {
    Ok(Subscription {
        id: SubscriptionId::new(row.subscription_id),
        tenant_id: TenantId::from_uuid(row.tenant_id),
        customer_id: GatewayCustomerId::new(row.customer_id),
        item_id: SubscriptionItemId::new(row.item_id),
        plan_id: PriceId::new(row.plan_id),
        status: enum_from_text(&row.status, "status")?,
        unit_amount: money(row.unit_amount_minor, &row.currency)?,
        interval: enum_from_text(&row.billing_interval, "billing_interval")?,
        current_period_start: row.current_period_start,
        current_period_end: row.current_period_end,
        cancel_at_period_end: row.cancel_at_period_end,
        canceled_at: row.canceled_at,
        client_secret: row.client_secret,
        created_at: row.created_at,
    })
}

fn subscription_to_row(subscription: &Subscription) -> Result<SubscriptionRow, DatabaseError> {
    Ok(SubscriptionRow {
        subscription_id: subscription.id.as_str().to_string(),
        tenant_id: *subscription.tenant_id.as_uuid(),
        customer_id: subscription.customer_id.as_str().to_string(),
        item_id: subscription.item_id.as_str().to_string(),
        plan_id: subscription.plan_id.as_str().to_string(),
        status: enum_to_text(&subscription.status, "status")?,
        unit_amount_minor: subscription.unit_amount.minor_units(),
        currency: subscription.unit_amount.currency().code().to_string(),
        billing_interval: enum_to_text(&subscription.interval, "billing_interval")?,
        current_period_start: subscription.current_period_start,
        current_period_end: subscription.current_period_end,
        cancel_at_period_end: subscription.cancel_at_period_end,
        canceled_at: subscription.canceled_at,
        client_secret: subscription.client_secret.clone(),
        created_at: subscription.created_at,
    })
}

// ============================================================================
// Port implementation
// ============================================================================

impl DomainPort for PostgresPaymentStore {}

#[async_trait]
impl HealthCheckable for PostgresPaymentStore {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();

        let result = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(self.repository.pool())
            .await;

        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthCheckResult::healthy(ADAPTER_ID),
            Err(e) => HealthCheckResult::unhealthy(ADAPTER_ID, format!("Database error: {}", e)),
        }
        .measured(latency_ms)
    }
}

#[async_trait]
impl PaymentStorePort for PostgresPaymentStore {
    #[instrument(skip(self), fields(tenant_id = %id))]
    async fn get_tenant(&self, id: TenantId) -> Result<Tenant, PortError> {
        match self.repository.get_tenant(*id.as_uuid()).await {
            Ok(row) => Ok(tenant_from_row(row)),
            Err(e) if e.is_not_found() => Err(PortError::not_found("Tenant", id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_tenant(&self, tenant: &Tenant) -> Result<(), PortError> {
        Ok(self.repository.upsert_tenant(&tenant_to_row(tenant)).await?)
    }

    #[instrument(skip(self), fields(booking_id = %id))]
    async fn get_booking(&self, id: BookingId) -> Result<Booking, PortError> {
        match self.repository.get_booking(*id.as_uuid()).await {
            Ok(row) => Ok(booking_from_row(row)?),
            Err(e) if e.is_not_found() => Err(PortError::not_found("Booking", id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_booking(&self, booking: &Booking) -> Result<(), PortError> {
        let row = BookingRow {
            booking_id: *booking.id.as_uuid(),
            tenant_id: *booking.tenant_id.as_uuid(),
            customer_id: *booking.customer_id.as_uuid(),
            total_minor: booking.total_amount.minor_units(),
            currency: booking.total_amount.currency().code().to_string(),
            created_at: booking.created_at,
        };
        Ok(self.repository.upsert_booking(&row).await?)
    }

    #[instrument(skip(self), fields(booking_id = %booking_id))]
    async fn list_booking_payments(&self, booking_id: BookingId) -> Result<Vec<BookingPayment>, PortError> {
        let rows = self.repository.list_booking_payments(*booking_id.as_uuid()).await?;
        rows.into_iter()
            .map(|row| booking_payment_from_row(row).map_err(PortError::from))
            .collect()
    }

    async fn find_booking_payment(&self, payment_intent_id: &PaymentIntentId) -> Result<Option<BookingPayment>, PortError> {
        let row = self.repository.find_booking_payment(payment_intent_id.as_str()).await?;
        Ok(row.map(booking_payment_from_row).transpose()?)
    }

    async fn save_booking_payment(&self, payment: &BookingPayment) -> Result<(), PortError> {
        Ok(self
            .repository
            .upsert_booking_payment(&booking_payment_to_row(payment)?)
            .await?)
    }

    async fn find_payment_intent(&self, id: &PaymentIntentId) -> Result<Option<PaymentIntent>, PortError> {
        let row = self.repository.find_payment_intent(id.as_str()).await?;
        Ok(row.map(intent_from_row).transpose()?)
    }

    async fn save_payment_intent(&self, intent: &PaymentIntent) -> Result<(), PortError> {
        Ok(self.repository.upsert_payment_intent(&intent_to_row(intent)?).await?)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn list_payment_intents(
        &self,
        tenant_id: TenantId,
        from: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<PaymentIntent>, PortError> {
        let rows = self
            .repository
            .list_payment_intents(*tenant_id.as_uuid(), from, before)
            .await?;
        rows.into_iter()
            .map(|row| intent_from_row(row).map_err(PortError::from))
            .collect()
    }

    async fn save_refund(&self, refund: &Refund) -> Result<(), PortError> {
        Ok(self.repository.upsert_refund(&refund_to_row(refund)?).await?)
    }

    async fn list_refunds(&self, payment_intent_id: &PaymentIntentId) -> Result<Vec<Refund>, PortError> {
        let rows = self.repository.list_refunds(payment_intent_id.as_str()).await?;
        rows.into_iter()
            .map(|row| refund_from_row(row).map_err(PortError::from))
            .collect()
    }

    async fn find_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>, PortError> {
        let row = self.repository.find_subscription(id.as_str()).await?;
        Ok(row.map(subscription_from_row).transpose()?)
    }

    async fn save_subscription(&self, subscription: &Subscription) -> Result<(), PortError> {
        Ok(self
            .repository
            .upsert_subscription(&subscription_to_row(subscription)?)
            .await?)
    }

    async fn is_webhook_event_processed(&self, event_id: &EventId) -> Result<bool, PortError> {
        Ok(self.repository.is_webhook_event_processed(event_id.as_str()).await?)
    }

    async fn record_webhook_event(&self, event_id: &EventId, event_type: &str) -> Result<bool, PortError> {
        Ok(self
            .repository
            .record_webhook_event(event_id.as_str(), event_type)
            .await?)
    }
}
