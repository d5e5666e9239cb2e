//! Audit events for the payments domain
//!
//! Every money movement, status transition (applied or rejected),
//! subscription and account change and webhook dispatch is published to the
//! audit sink. Publishing never fails the operation that produced the event:
//! sink errors are logged and dropped.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use core_kernel::{
    AuditEventId, BookingId, ConnectedAccountId, EventId, Money, PaymentIntentId, PriceId,
    RefundId, SubscriptionId, TenantId,
};

use crate::booking::PaymentType;
use crate::intent::PaymentStatus;
use crate::ports::AuditSinkPort;
use crate::refund::RefundReason;
use crate::subscription::SubscriptionStatus;

/// What caused a payment status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionSource {
    Webhook,
    Polling,
    Refund,
    Reconciliation,
}

/// Kind of change made to a platform subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionAction {
    Created,
    PlanChanged,
    Canceled,
    SyncedFromWebhook,
}

/// Domain events emitted by the payment services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum PaymentEvent {
    /// A payment intent was created at the gateway
    PaymentIntentCreated {
        tenant_id: TenantId,
        payment_intent_id: PaymentIntentId,
        booking_id: Option<BookingId>,
        payment_type: Option<PaymentType>,
        amount: Money,
        application_fee: Option<Money>,
        attempts: u32,
    },

    /// Creating a payment intent failed after retries
    PaymentIntentFailed {
        tenant_id: TenantId,
        booking_id: Option<BookingId>,
        error_type: String,
        code: String,
        attempts: u32,
    },

    /// A payment status transition was applied locally
    PaymentStatusChanged {
        tenant_id: TenantId,
        payment_intent_id: PaymentIntentId,
        from: PaymentStatus,
        to: PaymentStatus,
        source: TransitionSource,
    },

    /// An illegal transition was observed and not applied
    TransitionRejected {
        tenant_id: TenantId,
        payment_intent_id: PaymentIntentId,
        from: PaymentStatus,
        to: PaymentStatus,
        source: TransitionSource,
    },

    /// A refund was issued by the gateway
    RefundIssued {
        tenant_id: TenantId,
        payment_intent_id: PaymentIntentId,
        refund_id: RefundId,
        amount: Money,
        reason: RefundReason,
        initiated_by: String,
    },

    /// A refund request failed validation and never reached the gateway
    RefundRejected {
        tenant_id: TenantId,
        payment_intent_id: PaymentIntentId,
        errors: Vec<String>,
        initiated_by: String,
    },

    /// A platform subscription changed
    SubscriptionChanged {
        tenant_id: TenantId,
        subscription_id: SubscriptionId,
        plan_id: PriceId,
        status: SubscriptionStatus,
        action: SubscriptionAction,
    },

    /// A connected account was created or updated
    ConnectedAccountChanged {
        tenant_id: TenantId,
        account_id: ConnectedAccountId,
        is_active: bool,
        onboarding_complete: bool,
    },

    /// A webhook event was verified and dispatched
    WebhookProcessed {
        event_id: EventId,
        webhook_type: String,
        handlers: Vec<String>,
        duplicate: bool,
    },

    /// A day-level reconciliation run completed
    ReconciliationCompleted {
        tenant_id: TenantId,
        date: NaiveDate,
        total_processed: u64,
        discrepancies: usize,
    },
}

impl PaymentEvent {
    /// Short name of the event, matching its serialized tag
    pub fn name(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentIntentCreated { .. } => "payment_intent_created",
            PaymentEvent::PaymentIntentFailed { .. } => "payment_intent_failed",
            PaymentEvent::PaymentStatusChanged { .. } => "payment_status_changed",
            PaymentEvent::TransitionRejected { .. } => "transition_rejected",
            PaymentEvent::RefundIssued { .. } => "refund_issued",
            PaymentEvent::RefundRejected { .. } => "refund_rejected",
            PaymentEvent::SubscriptionChanged { .. } => "subscription_changed",
            PaymentEvent::ConnectedAccountChanged { .. } => "connected_account_changed",
            PaymentEvent::WebhookProcessed { .. } => "webhook_processed",
            PaymentEvent::ReconciliationCompleted { .. } => "reconciliation_completed",
        }
    }

    /// Tenant the event belongs to, if any
    pub fn tenant_id(&self) -> Option<TenantId> {
        match self {
            PaymentEvent::PaymentIntentCreated { tenant_id, .. }
            | PaymentEvent::PaymentIntentFailed { tenant_id, .. }
            | PaymentEvent::PaymentStatusChanged { tenant_id, .. }
            | PaymentEvent::TransitionRejected { tenant_id, .. }
            | PaymentEvent::RefundIssued { tenant_id, .. }
            | PaymentEvent::RefundRejected { tenant_id, .. }
            | PaymentEvent::SubscriptionChanged { tenant_id, .. }
            | PaymentEvent::ConnectedAccountChanged { tenant_id, .. }
            | PaymentEvent::ReconciliationCompleted { tenant_id, .. } => Some(*tenant_id),
            PaymentEvent::WebhookProcessed { .. } => None,
        }
    }
}

/// An event with its audit envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditEventId,
    pub occurred_at: DateTime<Utc>,
    pub event: PaymentEvent,
}

impl AuditRecord {
    pub fn new(event: PaymentEvent) -> Self {
        Self {
            id: AuditEventId::new_v7(),
            occurred_at: Utc::now(),
            event,
        }
    }
}

/// Publishes an event, logging and swallowing sink failures
pub async fn emit(sink: &dyn AuditSinkPort, event: PaymentEvent) {
    let name = event.name();
    if let Err(error) = sink.publish(AuditRecord::new(event)).await {
        warn!(event = name, error = %error, "failed to publish audit event");
    }
}
