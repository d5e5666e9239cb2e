//! Payment intents and their lifecycle
//!
//! A payment intent is a single gateway-tracked money movement. Its status
//! is driven by the gateway and observed locally through webhooks, polling,
//! refunds and reconciliation. All of these paths go through
//! [`PaymentLifecycle::apply_status`], which enforces the transition table:
//!
//! ```text
//! pending ──► succeeded ──► refunded
//!    │
//!    └──────► failed
//! ```
//!
//! Re-applying the current status is a no-op, so duplicate webhook
//! deliveries are harmless. Any other transition is rejected and audited.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use core_kernel::{BookingId, ConnectedAccountId, Money, PaymentIntentId, TenantId};

use crate::error::{store_error, ProcessorError};
use crate::events::{emit, PaymentEvent, TransitionSource};
use crate::ports::{AuditSinkPort, PaymentStorePort, PaymentStorePortExt};

/// Metadata key carrying the booking an intent pays for
pub const METADATA_BOOKING_ID: &str = "booking_id";
/// Metadata key carrying the owning tenant
pub const METADATA_TENANT_ID: &str = "tenant_id";
pub const METADATA_CUSTOMER_ID: &str = "customer_id";
pub const METADATA_PAYMENT_TYPE: &str = "payment_type";
pub const METADATA_TOTAL_AMOUNT: &str = "total_amount";

/// Payment intent status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [
        PaymentStatus::Pending,
        PaymentStatus::Succeeded,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Checks the transition table
    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (*self, target),
            (Pending, Succeeded) |
            (Pending, Failed) |
            (Succeeded, Refunded)
        )
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Refunded)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = ProcessorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(ProcessorError::validation(format!("Unknown payment status: {other}"))),
        }
    }
}

/// Result of applying an observed status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied { from: PaymentStatus, to: PaymentStatus },
    /// The intent already had the observed status
    Unchanged,
}

/// A gateway-tracked money movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: PaymentIntentId,
    pub tenant_id: TenantId,
    pub amount: Money,
    pub status: PaymentStatus,
    /// Connected account receiving the transfer
    pub destination: Option<ConnectedAccountId>,
    pub application_fee: Option<Money>,
    /// Free-form gateway metadata; carries the booking linkage
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Secret the client needs to confirm the payment
    pub client_secret: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentIntent {
    /// Booking referenced in the metadata, if it parses
    pub fn booking_id(&self) -> Option<BookingId> {
        self.metadata.get(METADATA_BOOKING_ID).and_then(|v| v.parse().ok())
    }

    /// Moves to `target` if the transition table allows it
    pub fn transition_to(&mut self, target: PaymentStatus) -> Result<TransitionOutcome, ProcessorError> {
        if self.status == target {
            return Ok(TransitionOutcome::Unchanged);
        }
        if !self.status.can_transition_to(target) {
            return Err(ProcessorError::InvalidStatusTransition {
                from: self.status,
                to: target,
            });
        }
        let from = self.status;
        self.status = target;
        self.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied { from, to: target })
    }
}

/// Applies observed statuses to locally stored intents and booking payments
#[derive(Clone)]
pub struct PaymentLifecycle {
    store: Arc<dyn PaymentStorePort>,
    audit: Arc<dyn AuditSinkPort>,
}

impl PaymentLifecycle {
    pub fn new(store: Arc<dyn PaymentStorePort>, audit: Arc<dyn AuditSinkPort>) -> Self {
        Self { store, audit }
    }

    /// Applies `observed` to the stored intent `id`.
    ///
    /// Illegal transitions are audited and returned as
    /// `InvalidStatusTransition`; the stored record is left untouched.
    pub async fn apply_status(
        &self,
        id: &PaymentIntentId,
        observed: PaymentStatus,
        source: TransitionSource,
    ) -> Result<TransitionOutcome, ProcessorError> {
        let mut intent = self.store.get_payment_intent(id).await.map_err(store_error)?;
        let from = intent.status;

        let outcome = match intent.transition_to(observed) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(
                    payment_intent_id = %id,
                    tenant_id = %intent.tenant_id,
                    from = %from,
                    to = %observed,
                    source = ?source,
                    "rejected illegal payment status transition"
                );
                emit(
                    self.audit.as_ref(),
                    PaymentEvent::TransitionRejected {
                        tenant_id: intent.tenant_id,
                        payment_intent_id: id.clone(),
                        from,
                        to: observed,
                        source,
                    },
                )
                .await;
                return Err(error);
            }
        };

        if outcome == TransitionOutcome::Unchanged {
            debug!(payment_intent_id = %id, status = %observed, "status already applied");
            return Ok(outcome);
        }

        self.store.save_payment_intent(&intent).await?;
        if let Some(mut booking_payment) = self.store.find_booking_payment(id).await? {
            booking_payment.status = observed;
            booking_payment.updated_at = intent.updated_at;
            self.store.save_booking_payment(&booking_payment).await?;
        }

        info!(
            payment_intent_id = %id,
            tenant_id = %intent.tenant_id,
            from = %from,
            to = %observed,
            source = ?source,
            "payment status updated"
        );
        emit(
            self.audit.as_ref(),
            PaymentEvent::PaymentStatusChanged {
                tenant_id: intent.tenant_id,
                payment_intent_id: id.clone(),
                from,
                to: observed,
                source,
            },
        )
        .await;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;

    fn intent(status: PaymentStatus) -> PaymentIntent {
        let now = Utc::now();
        PaymentIntent {
            id: PaymentIntentId::new("pi_test"),
            tenant_id: TenantId::new(),
            amount: Money::from_minor(1000, Currency::USD),
            status,
            destination: None,
            application_fee: None,
            metadata: HashMap::new(),
            client_secret: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_transition_table() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(Succeeded));
        assert!(Pending.can_transition_to(Failed));
        assert!(Succeeded.can_transition_to(Refunded));

        assert!(!Failed.can_transition_to(Succeeded));
        assert!(!Refunded.can_transition_to(Succeeded));
        assert!(!Succeeded.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Refunded));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in PaymentStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for to in PaymentStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be illegal");
            }
        }
    }

    #[test]
    fn test_same_status_is_unchanged() {
        let mut pi = intent(PaymentStatus::Succeeded);
        assert_eq!(pi.transition_to(PaymentStatus::Succeeded).unwrap(), TransitionOutcome::Unchanged);
    }

    #[test]
    fn test_illegal_transition_leaves_status() {
        let mut pi = intent(PaymentStatus::Failed);
        let result = pi.transition_to(PaymentStatus::Succeeded);
        assert!(matches!(result, Err(ProcessorError::InvalidStatusTransition { .. })));
        assert_eq!(pi.status, PaymentStatus::Failed);
    }

    #[test]
    fn test_booking_id_from_metadata() {
        let booking = BookingId::new();
        let mut pi = intent(PaymentStatus::Pending);
        pi.metadata.insert(METADATA_BOOKING_ID.to_string(), booking.to_string());
        assert_eq!(pi.booking_id(), Some(booking));
    }
}
