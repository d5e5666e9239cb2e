//! Payments domain errors
//!
//! Three layers:
//! - [`GatewayError`] is the closed set of raw failure shapes a gateway adapter
//!   can report.
//! - [`PaymentError`] is the classified form produced by [`classify_error`],
//!   carrying the error type and whether a retry may succeed.
//! - [`ProcessorError`] is what callers of the payment services see.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_kernel::{BookingId, MoneyError, PaymentIntentId, PortError, TenantId};

use crate::intent::PaymentStatus;

/// Decline codes that describe a transient condition on the cardholder or
/// issuer side. Only these make a card error retryable.
pub const RETRYABLE_DECLINE_CODES: &[&str] = &[
    "insufficient_funds",
    "processing_error",
    "try_again_later",
    "issuer_not_available",
    "reenter_transaction",
];

/// Raw failure reported by a payment gateway adapter
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The card was declined or could not be charged
    #[error("card error: {message}")]
    Card {
        code: Option<String>,
        decline_code: Option<String>,
        message: String,
    },

    /// Too many requests against the gateway
    #[error("rate limited: {message}")]
    RateLimit { message: String },

    /// The gateway could not be reached
    #[error("connection error: {message}")]
    Connection { message: String },

    /// A single call exceeded its time budget
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    /// The gateway rejected the request parameters
    #[error("invalid request: {message}")]
    InvalidRequest {
        code: Option<String>,
        param: Option<String>,
        message: String,
    },

    /// API credentials were rejected
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// Any other typed error returned by the gateway API
    #[error("gateway api error (status {status:?}): {message}")]
    Api {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },

    /// The gateway response could not be decoded
    #[error("decode error: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn card(decline_code: impl Into<String>) -> Self {
        let decline_code = decline_code.into();
        GatewayError::Card {
            code: Some("card_declined".to_string()),
            message: format!("Your card was declined ({decline_code})"),
            decline_code: Some(decline_code),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        GatewayError::Connection { message: message.into() }
    }

    pub fn rate_limit() -> Self {
        GatewayError::RateLimit {
            message: "Too many requests".to_string(),
        }
    }

    pub fn not_found(resource: &str, id: impl fmt::Display) -> Self {
        GatewayError::InvalidRequest {
            code: Some("resource_missing".to_string()),
            param: Some("id".to_string()),
            message: format!("No such {resource}: '{id}'"),
        }
    }
}

/// Classified error type, as surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorType {
    CardError,
    RateLimitError,
    ConnectionError,
    ApiError,
}

impl PaymentErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentErrorType::CardError => "card_error",
            PaymentErrorType::RateLimitError => "rate_limit_error",
            PaymentErrorType::ConnectionError => "connection_error",
            PaymentErrorType::ApiError => "api_error",
        }
    }
}

impl fmt::Display for PaymentErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A gateway failure after classification
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{error_type} ({code}): {message}")]
pub struct PaymentError {
    pub error_type: PaymentErrorType,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_code: Option<String>,
    pub message: String,
    pub retryable: bool,
}

/// Maps a raw gateway failure onto the caller-visible taxonomy.
///
/// Card errors are retryable only for the decline codes listed in
/// [`RETRYABLE_DECLINE_CODES`]. Rate limits, connection failures and
/// timeouts are always retryable. Everything else is a non-retryable
/// `api_error`.
pub fn classify_error(raw: &GatewayError) -> PaymentError {
    match raw {
        GatewayError::Card { code, decline_code, message } => {
            let retryable = decline_code
                .as_deref()
                .map(|dc| RETRYABLE_DECLINE_CODES.contains(&dc))
                .unwrap_or(false);
            PaymentError {
                error_type: PaymentErrorType::CardError,
                code: code.clone().unwrap_or_else(|| "card_declined".to_string()),
                decline_code: decline_code.clone(),
                message: message.clone(),
                retryable,
            }
        }
        GatewayError::RateLimit { message } => PaymentError {
            error_type: PaymentErrorType::RateLimitError,
            code: "rate_limit".to_string(),
            decline_code: None,
            message: message.clone(),
            retryable: true,
        },
        GatewayError::Connection { message } => PaymentError {
            error_type: PaymentErrorType::ConnectionError,
            code: "connection_failed".to_string(),
            decline_code: None,
            message: message.clone(),
            retryable: true,
        },
        GatewayError::Timeout { .. } => PaymentError {
            error_type: PaymentErrorType::ConnectionError,
            code: "timeout".to_string(),
            decline_code: None,
            message: raw.to_string(),
            retryable: true,
        },
        GatewayError::InvalidRequest { code, message, .. } => PaymentError {
            error_type: PaymentErrorType::ApiError,
            code: code.clone().unwrap_or_else(|| "invalid_request".to_string()),
            decline_code: None,
            message: message.clone(),
            retryable: false,
        },
        GatewayError::Authentication { message } => PaymentError {
            error_type: PaymentErrorType::ApiError,
            code: "authentication_failed".to_string(),
            decline_code: None,
            message: message.clone(),
            retryable: false,
        },
        GatewayError::Api { code, message, .. } => PaymentError {
            error_type: PaymentErrorType::ApiError,
            code: code.clone().unwrap_or_else(|| "unknown_error".to_string()),
            decline_code: None,
            message: message.clone(),
            retryable: false,
        },
        GatewayError::Decode(message) => PaymentError {
            error_type: PaymentErrorType::ApiError,
            code: "unknown_error".to_string(),
            decline_code: None,
            message: message.clone(),
            retryable: false,
        },
    }
}

/// Errors returned by the payment services
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// A gateway call failed after classification and retries
    #[error("Gateway error: {0}")]
    Gateway(#[from] PaymentError),

    /// Request validation failed; every problem is listed
    #[error("Validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    #[error("No succeeded deposit found for booking {booking_id}")]
    NoDepositFound { booking_id: BookingId },

    #[error("Remaining balance for booking {booking_id} is already settled")]
    AlreadySettled { booking_id: BookingId },

    #[error("Remaining balance payment {payment_intent_id} for booking {booking_id} is still pending")]
    RemainingBalancePending {
        booking_id: BookingId,
        payment_intent_id: PaymentIntentId,
    },

    #[error("Invalid signature")]
    SignatureInvalid,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid payment status transition from {from} to {to}")]
    InvalidStatusTransition { from: PaymentStatus, to: PaymentStatus },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Tenant {tenant_id} has no connected account")]
    ConnectedAccountMissing { tenant_id: TenantId },

    #[error("Tenant {tenant_id} has no platform subscription")]
    SubscriptionMissing { tenant_id: TenantId },

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),

    #[error("Store error: {0}")]
    Store(#[from] PortError),
}

impl ProcessorError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        ProcessorError::NotFound { entity, id: id.to_string() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ProcessorError::ValidationFailed(vec![message.into()])
    }

    /// Stable machine-readable code for API responses and audit records
    pub fn code(&self) -> &'static str {
        match self {
            ProcessorError::Gateway(e) => e.error_type.as_str(),
            ProcessorError::ValidationFailed(_) => "validation_failed",
            ProcessorError::NoDepositFound { .. } => "no_deposit_found",
            ProcessorError::AlreadySettled { .. } => "already_settled",
            ProcessorError::RemainingBalancePending { .. } => "remaining_balance_pending",
            ProcessorError::SignatureInvalid => "signature_invalid",
            ProcessorError::MalformedPayload(_) => "malformed_payload",
            ProcessorError::InvalidStatusTransition { .. } => "invalid_status_transition",
            ProcessorError::NotFound { .. } => "not_found",
            ProcessorError::ConnectedAccountMissing { .. } => "connected_account_missing",
            ProcessorError::SubscriptionMissing { .. } => "subscription_missing",
            ProcessorError::Money(_) => "money_error",
            ProcessorError::Store(_) => "store_error",
        }
    }

    /// Validation messages, if this is a validation failure
    pub fn validation_errors(&self) -> &[String] {
        match self {
            ProcessorError::ValidationFailed(errors) => errors,
            _ => &[],
        }
    }
}

/// Store lookups that miss are reported as domain `NotFound`
pub(crate) fn store_error(error: PortError) -> ProcessorError {
    match error {
        PortError::NotFound { entity_type, id } => ProcessorError::NotFound {
            entity: entity_name(&entity_type),
            id,
        },
        other => ProcessorError::Store(other),
    }
}

fn entity_name(entity_type: &str) -> &'static str {
    match entity_type {
        "Tenant" => "Tenant",
        "Booking" => "Booking",
        "PaymentIntent" => "PaymentIntent",
        "Refund" => "Refund",
        "Subscription" => "Subscription",
        _ => "Record",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_is_retryable() {
        let error = classify_error(&GatewayError::card("insufficient_funds"));
        assert_eq!(error.error_type, PaymentErrorType::CardError);
        assert_eq!(error.decline_code.as_deref(), Some("insufficient_funds"));
        assert!(error.retryable);
    }

    #[test]
    fn test_stolen_card_is_not_retryable() {
        let error = classify_error(&GatewayError::card("stolen_card"));
        assert_eq!(error.error_type, PaymentErrorType::CardError);
        assert!(!error.retryable);

        let generic = classify_error(&GatewayError::card("generic_decline"));
        assert!(!generic.retryable);
    }

    #[test]
    fn test_transport_failures_are_retryable() {
        assert!(classify_error(&GatewayError::rate_limit()).retryable);
        assert!(classify_error(&GatewayError::connection("reset by peer")).retryable);

        let timeout = classify_error(&GatewayError::Timeout {
            operation: "create_payment_intent".to_string(),
            after_ms: 10_000,
        });
        assert_eq!(timeout.error_type, PaymentErrorType::ConnectionError);
        assert!(timeout.retryable);
    }

    #[test]
    fn test_unrecognized_shapes_fall_back_to_api_error() {
        let error = classify_error(&GatewayError::Decode("unexpected body".to_string()));
        assert_eq!(error.error_type, PaymentErrorType::ApiError);
        assert_eq!(error.code, "unknown_error");
        assert!(!error.retryable);

        let api = classify_error(&GatewayError::Api {
            status: Some(500),
            code: None,
            message: "boom".to_string(),
        });
        assert_eq!(api.code, "unknown_error");
        assert!(!api.retryable);
    }

    #[test]
    fn test_validation_message_lists_every_error() {
        let error = ProcessorError::ValidationFailed(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(error.to_string(), "Validation failed: a; b");
        assert_eq!(error.validation_errors().len(), 2);
    }

    #[test]
    fn test_signature_error_message() {
        assert_eq!(ProcessorError::SignatureInvalid.to_string(), "Invalid signature");
    }
}
