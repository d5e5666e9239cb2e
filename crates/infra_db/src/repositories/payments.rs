//! Payments repository
//!
//! Row types and SQL for the payments store. Queries are checked at runtime
//! and every save is an upsert keyed on the record's primary key.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DatabaseError;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TenantRow {
    pub tenant_id: Uuid,
    pub business_name: String,
    pub email: Option<String>,
    pub connected_account_id: Option<String>,
    pub gateway_customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BookingRow {
    pub booking_id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub total_minor: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BookingPaymentRow {
    pub payment_intent_id: String,
    pub booking_id: Uuid,
    pub customer_id: Uuid,
    pub tenant_id: Uuid,
    pub payment_type: String,
    pub amount_minor: i64,
    pub total_minor: i64,
    pub application_fee_minor: i64,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PaymentIntentRow {
    pub payment_intent_id: String,
    pub tenant_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub destination: Option<String>,
    pub application_fee_minor: Option<i64>,
    pub metadata: Json<HashMap<String, String>>,
    pub client_secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RefundRow {
    pub refund_id: String,
    pub payment_intent_id: String,
    pub tenant_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub reason: Option<String>,
    pub initiated_by: Option<String>,
    pub metadata: Json<HashMap<String, String>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SubscriptionRow {
    pub subscription_id: String,
    pub tenant_id: Uuid,
    pub customer_id: String,
    pub item_id: String,
    pub plan_id: String,
    pub status: String,
    pub unit_amount_minor: i64,
    pub currency: String,
    pub billing_interval: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub client_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Repository for the payments tables
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ========================================================================
    // Tenants and bookings
    // ========================================================================

    pub async fn get_tenant(&self, tenant_id: Uuid) -> Result<TenantRow, DatabaseError> {
        sqlx::query_as::<_, TenantRow>(
            r#"
            SELECT tenant_id, business_name, email, connected_account_id,
                   gateway_customer_id, subscription_id, created_at, updated_at
            FROM tenants
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Tenant", tenant_id))
    }

    pub async fn upsert_tenant(&self, row: &TenantRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO tenants (
                tenant_id, business_name, email, connected_account_id,
                gateway_customer_id, subscription_id, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (tenant_id) DO UPDATE SET
                business_name = EXCLUDED.business_name,
                email = EXCLUDED.email,
                connected_account_id = EXCLUDED.connected_account_id,
                gateway_customer_id = EXCLUDED.gateway_customer_id,
                subscription_id = EXCLUDED.subscription_id,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(row.tenant_id)
        .bind(&row.business_name)
        .bind(&row.email)
        .bind(&row.connected_account_id)
        .bind(&row.gateway_customer_id)
        .bind(&row.subscription_id)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<BookingRow, DatabaseError> {
        sqlx::query_as::<_, BookingRow>(
            r#"
            SELECT booking_id, tenant_id, customer_id, total_minor, currency, created_at
            FROM bookings
            WHERE booking_id = $1
            "#,
        )
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Booking", booking_id))
    }

    pub async fn upsert_booking(&self, row: &BookingRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO bookings (booking_id, tenant_id, customer_id, total_minor, currency, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (booking_id) DO UPDATE SET
                customer_id = EXCLUDED.customer_id,
                total_minor = EXCLUDED.total_minor,
                currency = EXCLUDED.currency
            "#,
        )
        .bind(row.booking_id)
        .bind(row.tenant_id)
        .bind(row.customer_id)
        .bind(row.total_minor)
        .bind(&row.currency)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Booking payments
    // ========================================================================

    pub async fn list_booking_payments(&self, booking_id: Uuid) -> Result<Vec<BookingPaymentRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, BookingPaymentRow>(
            r#"
            SELECT payment_intent_id, booking_id, customer_id, tenant_id, payment_type,
                   amount_minor, total_minor, application_fee_minor, currency, status,
                   created_at, updated_at
            FROM booking_payments
            WHERE booking_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn find_booking_payment(&self, payment_intent_id: &str) -> Result<Option<BookingPaymentRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, BookingPaymentRow>(
            r#"
            SELECT payment_intent_id, booking_id, customer_id, tenant_id, payment_type,
                   amount_minor, total_minor, application_fee_minor, currency, status,
                   created_at, updated_at
            FROM booking_payments
            WHERE payment_intent_id = $1
            "#,
        )
        .bind(payment_intent_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn upsert_booking_payment(&self, row: &BookingPaymentRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO booking_payments (
                payment_intent_id, booking_id, customer_id, tenant_id, payment_type,
                amount_minor, total_minor, application_fee_minor, currency, status,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (payment_intent_id) DO UPDATE SET
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&row.payment_intent_id)
        .bind(row.booking_id)
        .bind(row.customer_id)
        .bind(row.tenant_id)
        .bind(&row.payment_type)
        .bind(row.amount_minor)
        .bind(row.total_minor)
        .bind(row.application_fee_minor)
        .bind(&row.currency)
        .bind(&row.status)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Payment intents
    // ========================================================================

    pub async fn find_payment_intent(&self, payment_intent_id: &str) -> Result<Option<PaymentIntentRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, PaymentIntentRow>(
            r#"
            SELECT payment_intent_id, tenant_id, amount_minor, currency, status, destination,
                   application_fee_minor, metadata, client_secret, created_at, updated_at
            FROM payment_intents
            WHERE payment_intent_id = $1
            "#,
        )
        .bind(payment_intent_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn list_payment_intents(
        &self,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        before: DateTime<Utc>,
    ) -> Result<Vec<PaymentIntentRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, PaymentIntentRow>(
            r#"
            SELECT payment_intent_id, tenant_id, amount_minor, currency, status, destination,
                   application_fee_minor, metadata, client_secret, created_at, updated_at
            FROM payment_intents
            WHERE tenant_id = $1 AND created_at >= $2 AND created_at < $3
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .bind(from)
        .bind(before)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn upsert_payment_intent(&self, row: &PaymentIntentRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO payment_intents (
                payment_intent_id, tenant_id, amount_minor, currency, status, destination,
                application_fee_minor, metadata, client_secret, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (payment_intent_id) DO UPDATE SET
                status = EXCLUDED.status,
                metadata = EXCLUDED.metadata,
                client_secret = COALESCE(EXCLUDED.client_secret, payment_intents.client_secret),
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&row.payment_intent_id)
        .bind(row.tenant_id)
        .bind(row.amount_minor)
        .bind(&row.currency)
        .bind(&row.status)
        .bind(&row.destination)
        .bind(row.application_fee_minor)
        .bind(&row.metadata)
        .bind(&row.client_secret)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Refunds and subscriptions
    // ========================================================================

    pub async fn list_refunds(&self, payment_intent_id: &str) -> Result<Vec<RefundRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, RefundRow>(
            r#"
            SELECT refund_id, payment_intent_id, tenant_id, amount_minor, currency, status,
                   reason, initiated_by, metadata, created_at
            FROM refunds
            WHERE payment_intent_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(payment_intent_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn upsert_refund(&self, row: &RefundRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO refunds (
                refund_id, payment_intent_id, tenant_id, amount_minor, currency, status,
                reason, initiated_by, metadata, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (refund_id) DO UPDATE SET status = EXCLUDED.status
            "#,
        )
        .bind(&row.refund_id)
        .bind(&row.payment_intent_id)
        .bind(row.tenant_id)
        .bind(row.amount_minor)
        .bind(&row.currency)
        .bind(&row.status)
        .bind(&row.reason)
        .bind(&row.initiated_by)
        .bind(&row.metadata)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_subscription(&self, subscription_id: &str) -> Result<Option<SubscriptionRow>, DatabaseError> {
        Ok(sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT subscription_id, tenant_id, customer_id, item_id, plan_id, status,
                   unit_amount_minor, currency, billing_interval, current_period_start,
                   current_period_end, cancel_at_period_end, canceled_at, client_secret, created_at
            FROM subscriptions
            WHERE subscription_id = $1
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn upsert_subscription(&self, row: &SubscriptionRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                subscription_id, tenant_id, customer_id, item_id, plan_id, status,
                unit_amount_minor, currency, billing_interval, current_period_start,
                current_period_end, cancel_at_period_end, canceled_at, client_secret, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (subscription_id) DO UPDATE SET
                item_id = EXCLUDED.item_id,
                plan_id = EXCLUDED.plan_id,
                status = EXCLUDED.status,
                unit_amount_minor = EXCLUDED.unit_amount_minor,
                currency = EXCLUDED.currency,
                billing_interval = EXCLUDED.billing_interval,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                canceled_at = EXCLUDED.canceled_at
            "#,
        )
        .bind(&row.subscription_id)
        .bind(row.tenant_id)
        .bind(&row.customer_id)
        .bind(&row.item_id)
        .bind(&row.plan_id)
        .bind(&row.status)
        .bind(row.unit_amount_minor)
        .bind(&row.currency)
        .bind(&row.billing_interval)
        .bind(row.current_period_start)
        .bind(row.current_period_end)
        .bind(row.cancel_at_period_end)
        .bind(row.canceled_at)
        .bind(&row.client_secret)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ========================================================================
    // Webhook events
    // ========================================================================

    pub async fn is_webhook_event_processed(&self, event_id: &str) -> Result<bool, DatabaseError> {
        let found: Option<i32> = sqlx::query_scalar("SELECT 1 FROM processed_webhook_events WHERE event_id = $1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Returns false if the event was already recorded
    pub async fn record_webhook_event(&self, event_id: &str, event_type: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_webhook_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
