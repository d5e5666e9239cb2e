//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use core_kernel::{Currency, Money, Rate};
use domain_payments::{GatewayError, PaymentStatus};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for generating valid Currency values
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::USD),
        Just(Currency::EUR),
        Just(Currency::GBP),
        Just(Currency::JPY),
        Just(Currency::CHF),
        Just(Currency::INR),
        Just(Currency::AUD),
        Just(Currency::CAD),
        Just(Currency::SGD),
        Just(Currency::HKD),
    ]
}

/// Strategy for booking totals in minor units
pub fn booking_total_strategy() -> impl Strategy<Value = i64> {
    1i64..100_000_000i64
}

/// Strategy for generating valid USD Money values
pub fn usd_money_strategy() -> impl Strategy<Value = Money> {
    booking_total_strategy().prop_map(|amount| Money::from_minor(amount, Currency::USD))
}

/// Strategy for deposit shares strictly between 0% and 100%
pub fn deposit_rate_strategy() -> impl Strategy<Value = Rate> {
    (1u32..10_000u32).prop_map(|basis_points| Rate::new(Decimal::new(basis_points as i64, 4)))
}

/// Refund amounts that must be rejected before reaching the gateway
pub fn non_positive_refund_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![Just(0i64), -1_000_000i64..0i64]
}

pub fn payment_status_strategy() -> impl Strategy<Value = PaymentStatus> {
    prop::sample::select(PaymentStatus::ALL.to_vec())
}

/// Every status a refund must be refused for
pub fn unrefundable_status_strategy() -> impl Strategy<Value = PaymentStatus> {
    prop_oneof![
        Just(PaymentStatus::Pending),
        Just(PaymentStatus::Failed),
        Just(PaymentStatus::Refunded),
    ]
}

/// Gateway failures the retry executor retries
pub fn transient_error_strategy() -> impl Strategy<Value = GatewayError> {
    prop_oneof![
        Just(GatewayError::rate_limit()),
        Just(GatewayError::connection("connection reset by peer")),
        Just(GatewayError::card("insufficient_funds")),
        Just(GatewayError::card("processing_error")),
        Just(GatewayError::card("try_again_later")),
    ]
}

/// Gateway failures that end the attempt loop immediately
pub fn permanent_error_strategy() -> impl Strategy<Value = GatewayError> {
    prop_oneof![
        Just(GatewayError::card("stolen_card")),
        Just(GatewayError::card("do_not_honor")),
        Just(GatewayError::Authentication {
            message: "Invalid API Key provided".to_string(),
        }),
        Just(GatewayError::not_found("payment_intent", "pi_missing")),
    ]
}
