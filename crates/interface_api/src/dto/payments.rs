//! Booking payment and refund DTOs

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use core_kernel::{BookingId, Currency, CustomerId, Money, PaymentIntentId};
use domain_payments::{BookingPayment, PaymentIntent, PaymentStatus, PaymentType, Refund, RefundReason};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingPaymentRequest {
    pub booking_id: BookingId,
    pub customer_id: CustomerId,
    /// Booking total in minor units
    #[validate(range(min = 1, message = "Total amount must be greater than 0"))]
    pub total_amount: i64,
    /// Defaults to the configured currency
    pub currency: Option<Currency>,
    pub payment_type: PaymentType,
    /// Deposit share in percent, e.g. 30
    pub deposit_percentage: Option<Decimal>,
    #[validate(length(min = 1, max = 255))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RemainingBalanceRequest {
    pub customer_id: CustomerId,
    #[validate(length(min = 1, max = 255))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookingPaymentResponse {
    pub payment_intent_id: PaymentIntentId,
    pub booking_id: BookingId,
    pub payment_type: PaymentType,
    pub amount: Money,
    pub total_amount: Money,
    pub application_fee: Money,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub attempts: u32,
}

impl BookingPaymentResponse {
    pub fn new(payment: BookingPayment, client_secret: Option<String>, attempts: u32) -> Self {
        Self {
            payment_intent_id: payment.payment_intent_id,
            booking_id: payment.booking_id,
            payment_type: payment.payment_type,
            amount: payment.amount,
            total_amount: payment.total_amount,
            application_fee: payment.application_fee,
            status: payment.status,
            client_secret,
            attempts,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub payment_intent_id: PaymentIntentId,
    pub status: PaymentStatus,
    pub amount: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_fee: Option<Money>,
    pub metadata: HashMap<String, String>,
}

impl From<PaymentIntent> for PaymentStatusResponse {
    fn from(intent: PaymentIntent) -> Self {
        Self {
            payment_intent_id: intent.id,
            status: intent.status,
            amount: intent.amount,
            application_fee: intent.application_fee,
            metadata: intent.metadata,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRefundRequest {
    /// Partial amount in minor units; the whole refundable balance when absent
    pub amount: Option<i64>,
    #[serde(default)]
    pub reason: RefundReason,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[validate(length(min = 1, max = 255))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub refund: Refund,
    pub fully_refunded: bool,
    pub attempts: u32,
}
