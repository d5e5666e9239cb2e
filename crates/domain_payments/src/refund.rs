//! Refund validation and processing
//!
//! A refund request is validated against the current gateway state of the
//! payment before anything is sent to the refund primitive. All validation
//! failures are collected so a caller can show every problem at once; if
//! any are found the gateway is never asked to refund.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use core_kernel::{Money, PaymentIntentId, RefundId, TenantId};

use crate::error::ProcessorError;
use crate::events::{emit, PaymentEvent, TransitionSource};
use crate::intent::{PaymentIntent, PaymentStatus};
use crate::ports::CreateRefundRequest;
use crate::services::PaymentContext;

pub const PAYMENT_NOT_SUCCEEDED: &str = "Payment must be succeeded to process refund";
pub const REFUND_AMOUNT_NOT_POSITIVE: &str = "Refund amount must be greater than 0";
pub const PAYMENT_NOT_OWNED: &str = "Payment does not belong to this tenant";

/// Why a refund was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
    Duplicate,
    Fraudulent,
    #[default]
    RequestedByCustomer,
}

impl RefundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundReason::Duplicate => "duplicate",
            RefundReason::Fraudulent => "fraudulent",
            RefundReason::RequestedByCustomer => "requested_by_customer",
        }
    }
}

impl fmt::Display for RefundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refund status as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Succeeded,
    Failed,
    Canceled,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Succeeded => "succeeded",
            RefundStatus::Failed => "failed",
            RefundStatus::Canceled => "canceled",
        }
    }

    /// Pending and succeeded refunds count against the refundable balance
    pub fn holds_funds(&self) -> bool {
        matches!(self, RefundStatus::Pending | RefundStatus::Succeeded)
    }
}

/// A refund issued against a payment intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: RefundId,
    pub payment_intent_id: PaymentIntentId,
    pub tenant_id: TenantId,
    pub amount: Money,
    pub status: RefundStatus,
    pub reason: Option<RefundReason>,
    pub initiated_by: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// A refund request from a caller
#[derive(Debug, Clone, Default)]
pub struct RefundRequest {
    /// Partial amount in minor units; the whole refundable balance when absent
    pub amount: Option<i64>,
    pub reason: RefundReason,
    pub initiated_by: String,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: Option<String>,
}

/// A refund accepted by the gateway
#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub refund: Refund,
    pub attempts: u32,
    /// True when nothing is left to refund on the payment
    pub fully_refunded: bool,
}

/// Validates and issues refunds
pub struct RefundProcessor {
    ctx: PaymentContext,
}

impl RefundProcessor {
    pub fn new(ctx: PaymentContext) -> Self {
        Self { ctx }
    }

    /// Current gateway view of a payment
    pub async fn get_payment_status(&self, payment_id: &PaymentIntentId) -> Result<PaymentIntent, ProcessorError> {
        Ok(self
            .ctx
            .retry
            .execute_with_retry("retrieve_payment_intent", || {
                self.ctx.gateway.retrieve_payment_intent(payment_id)
            })
            .await
            .into_result()?)
    }

    /// Amount already refunded or being refunded on a payment
    async fn refunded_so_far(&self, payment: &PaymentIntent) -> Result<Money, ProcessorError> {
        let refunds = self
            .ctx
            .retry
            .execute_with_retry("list_refunds", || {
                self.ctx.gateway.list_refunds_for_payment(&payment.id)
            })
            .await
            .into_result()?;
        Ok(Money::sum(
            refunds.iter().filter(|r| r.status.holds_funds()).map(|r| &r.amount),
            payment.amount.currency(),
        )?)
    }

    /// Validates a refund request and, if it passes, issues the refund
    pub async fn process_refund_with_validation(
        &self,
        tenant_id: TenantId,
        payment_id: &PaymentIntentId,
        request: RefundRequest,
    ) -> Result<RefundOutcome, ProcessorError> {
        let payment = self.get_payment_status(payment_id).await?;

        let mut errors = Vec::new();
        if payment.tenant_id != tenant_id {
            errors.push(PAYMENT_NOT_OWNED.to_string());
        }
        if payment.status != PaymentStatus::Succeeded {
            errors.push(PAYMENT_NOT_SUCCEEDED.to_string());
        }
        if let Some(amount) = request.amount {
            if amount <= 0 {
                errors.push(REFUND_AMOUNT_NOT_POSITIVE.to_string());
            }
        }

        let mut refundable = None;
        if errors.is_empty() {
            let already = self.refunded_so_far(&payment).await?;
            let balance = payment.amount.checked_sub(&already)?;
            let requested = request.amount.unwrap_or(balance.minor_units());
            if !balance.is_positive() {
                errors.push("Payment has already been fully refunded".to_string());
            } else if requested > balance.minor_units() {
                errors.push(format!("Refund amount exceeds refundable balance of {}", balance));
            }
            refundable = Some(balance);
        }

        if !errors.is_empty() {
            warn!(
                tenant_id = %tenant_id,
                payment_intent_id = %payment_id,
                errors = ?errors,
                "refund rejected by validation"
            );
            emit(
                self.ctx.audit.as_ref(),
                PaymentEvent::RefundRejected {
                    tenant_id,
                    payment_intent_id: payment_id.clone(),
                    errors: errors.clone(),
                    initiated_by: request.initiated_by.clone(),
                },
            )
            .await;
            return Err(ProcessorError::ValidationFailed(errors));
        }

        let balance = refundable.unwrap_or(payment.amount);
        let amount = request
            .amount
            .map(|minor| Money::from_minor(minor, payment.amount.currency()));
        let fully_refunded = amount.map_or(true, |a| a.minor_units() == balance.minor_units());

        let mut metadata = request.metadata.clone();
        metadata.insert("tenant_id".to_string(), tenant_id.to_string());
        metadata.insert("initiated_by".to_string(), request.initiated_by.clone());

        let gateway_request = CreateRefundRequest {
            tenant_id,
            payment_intent_id: payment_id.clone(),
            amount,
            reason: request.reason,
            initiated_by: request.initiated_by.clone(),
            metadata,
            idempotency_key: request.idempotency_key.clone(),
        };

        let outcome = self
            .ctx
            .retry
            .execute_with_retry("create_refund", || {
                self.ctx.gateway.create_refund(gateway_request.clone())
            })
            .await;
        let attempts = outcome.attempts;
        let refund = outcome.into_result()?;

        self.ctx.store.save_refund(&refund).await?;

        if fully_refunded {
            match self
                .ctx
                .lifecycle
                .apply_status(payment_id, PaymentStatus::Refunded, TransitionSource::Refund)
                .await
            {
                Ok(_) => {}
                Err(ProcessorError::NotFound { .. }) => {
                    warn!(payment_intent_id = %payment_id, "refunded payment has no local record");
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            tenant_id = %tenant_id,
            payment_intent_id = %payment_id,
            refund_id = %refund.id,
            amount = refund.amount.minor_units(),
            fully_refunded,
            "refund issued"
        );
        emit(
            self.ctx.audit.as_ref(),
            PaymentEvent::RefundIssued {
                tenant_id,
                payment_intent_id: payment_id.clone(),
                refund_id: refund.id.clone(),
                amount: refund.amount,
                reason: request.reason,
                initiated_by: request.initiated_by,
            },
        )
        .await;

        Ok(RefundOutcome {
            refund,
            attempts,
            fully_refunded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_serialization() {
        let json = serde_json::to_string(&RefundReason::RequestedByCustomer).unwrap();
        assert_eq!(json, "\"requested_by_customer\"");
        assert_eq!(RefundReason::default(), RefundReason::RequestedByCustomer);
    }

    #[test]
    fn test_failed_refunds_release_funds() {
        assert!(RefundStatus::Pending.holds_funds());
        assert!(RefundStatus::Succeeded.holds_funds());
        assert!(!RefundStatus::Failed.holds_funds());
        assert!(!RefundStatus::Canceled.holds_funds());
    }
}
