//! Tests for the payments domain building blocks

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use proptest::prelude::*;
use rust_decimal_macros::dec;

use core_kernel::{Currency, Money, Rate};

use domain_payments::booking::{payment_amount, remaining_balance, FeeSchedule, PaymentType};
use domain_payments::error::{classify_error, GatewayError, PaymentErrorType, ProcessorError};
use domain_payments::intent::PaymentStatus;
use domain_payments::retry::{RetryExecutor, RetryOptions, RetryOutcome};
use domain_payments::subscription::{BillingInterval, SubscriptionStatus};
use domain_payments::webhook::{GatewayEvent, SignatureError, WebhookVerifier};

fn usd(minor: i64) -> Money {
    Money::from_minor(minor, Currency::USD)
}

// ============================================================================
// Error Classification Tests
// ============================================================================

mod classification_tests {
    use super::*;

    #[test]
    fn test_transient_decline_codes_are_retryable() {
        for code in ["insufficient_funds", "processing_error", "try_again_later"] {
            let classified = classify_error(&GatewayError::card(code));
            assert_eq!(classified.error_type, PaymentErrorType::CardError);
            assert!(classified.retryable, "{code} should be retryable");
        }
    }

    #[test]
    fn test_hard_declines_are_final() {
        for code in ["stolen_card", "lost_card", "do_not_honor", "expired_card"] {
            let classified = classify_error(&GatewayError::card(code));
            assert!(!classified.retryable, "{code} should not be retryable");
            assert_eq!(classified.decline_code.as_deref(), Some(code));
        }
    }

    #[test]
    fn test_card_error_without_decline_code_is_final() {
        let classified = classify_error(&GatewayError::Card {
            code: Some("incorrect_cvc".to_string()),
            decline_code: None,
            message: "Your card's security code is incorrect.".to_string(),
        });
        assert_eq!(classified.code, "incorrect_cvc");
        assert!(!classified.retryable);
    }

    #[test]
    fn test_rate_limit_and_connection_are_retryable() {
        let rate = classify_error(&GatewayError::rate_limit());
        assert_eq!(rate.error_type, PaymentErrorType::RateLimitError);
        assert!(rate.retryable);

        let conn = classify_error(&GatewayError::connection("reset by peer"));
        assert_eq!(conn.error_type, PaymentErrorType::ConnectionError);
        assert!(conn.retryable);
    }

    #[test]
    fn test_everything_else_is_api_error() {
        let auth = classify_error(&GatewayError::Authentication {
            message: "Invalid API Key provided".to_string(),
        });
        assert_eq!(auth.error_type, PaymentErrorType::ApiError);
        assert!(!auth.retryable);

        let missing = classify_error(&GatewayError::not_found("payment_intent", "pi_123"));
        assert_eq!(missing.error_type, PaymentErrorType::ApiError);
        assert_eq!(missing.code, "resource_missing");
        assert!(!missing.retryable);
    }

    #[test]
    fn test_processor_error_codes() {
        let gateway: ProcessorError = classify_error(&GatewayError::rate_limit()).into();
        assert_eq!(gateway.code(), "rate_limit_error");
        assert_eq!(ProcessorError::SignatureInvalid.to_string(), "Invalid signature");
        assert_eq!(ProcessorError::validation("bad").validation_errors(), ["bad".to_string()]);
    }
}

// ============================================================================
// Retry Executor Tests
// ============================================================================

mod retry_tests {
    use super::*;

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let outcome = RetryExecutor::new(RetryOptions::immediate(3))
            .execute_with_retry("create_payment_intent", || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt < 3 {
                        Err(GatewayError::connection("connection reset"))
                    } else {
                        Ok("pi_123")
                    }
                }
            })
            .await;

        assert!(outcome.success());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.into_result().unwrap(), "pi_123");
    }

    #[tokio::test]
    async fn test_retryable_card_decline_exhausts_budget() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = RetryExecutor::new(RetryOptions::immediate(3))
            .execute_with_retry("confirm_payment_intent", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GatewayError::card("insufficient_funds")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let error = outcome.into_result().unwrap_err();
        assert_eq!(error.decline_code.as_deref(), Some("insufficient_funds"));
        assert!(error.retryable);
    }

    #[tokio::test]
    async fn test_single_attempt_budget_never_retries() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = RetryExecutor::new(RetryOptions::immediate(1))
            .execute_with_retry("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GatewayError::rate_limit()) }
            })
            .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_per_call_timeout_is_retried() {
        let calls = AtomicU32::new(0);
        let options = RetryOptions::immediate(3).with_timeout(Duration::from_millis(20));
        let outcome = RetryExecutor::new(options)
            .execute_with_retry("slow", || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt == 1 {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Ok::<_, GatewayError>(attempt)
                }
            })
            .await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.into_result().unwrap(), 2);
    }
}

// ============================================================================
// Booking Amount Tests
// ============================================================================

mod booking_amount_tests {
    use super::*;

    #[test]
    fn test_deposit_amount_uses_share() {
        let amount = payment_amount(&usd(10_000), PaymentType::Deposit, Rate::new(dec!(0.30))).unwrap();
        assert_eq!(amount, usd(3_000));
    }

    #[test]
    fn test_full_payment_charges_total() {
        let amount = payment_amount(&usd(10_000), PaymentType::FullPayment, Rate::new(dec!(0.30))).unwrap();
        assert_eq!(amount, usd(10_000));
    }

    #[test]
    fn test_remaining_balance_is_not_a_direct_payment_type() {
        let result = payment_amount(&usd(10_000), PaymentType::RemainingBalance, Rate::new(dec!(0.30)));
        assert!(matches!(result, Err(ProcessorError::ValidationFailed(_))));
    }

    #[test]
    fn test_remaining_balance_after_deposit() {
        assert_eq!(remaining_balance(&usd(10_000), &usd(3_000)).unwrap(), usd(7_000));
    }

    #[test]
    fn test_default_fee_schedule() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.fee_for(&usd(10_000)).unwrap(), usd(320));
    }

    #[test]
    fn test_fee_never_exceeds_amount() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.fee_for(&usd(20)).unwrap(), usd(20));
    }

    #[test]
    fn test_payment_type_parsing() {
        assert_eq!("deposit".parse::<PaymentType>().unwrap(), PaymentType::Deposit);
        assert_eq!("full_payment".parse::<PaymentType>().unwrap(), PaymentType::FullPayment);
        assert!("layaway".parse::<PaymentType>().is_err());
    }
}

// ============================================================================
// Payment Status Tests
// ============================================================================

mod status_tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Succeeded));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Failed));
        assert!(PaymentStatus::Succeeded.can_transition_to(PaymentStatus::Refunded));
    }

    #[test]
    fn test_terminal_statuses_have_no_exits() {
        for terminal in [PaymentStatus::Failed, PaymentStatus::Refunded] {
            assert!(terminal.is_terminal());
            for target in PaymentStatus::ALL {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn test_no_backwards_transitions() {
        assert!(!PaymentStatus::Succeeded.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Succeeded.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Refunded));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in PaymentStatus::ALL {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
    }
}

// ============================================================================
// Subscription Tests
// ============================================================================

mod subscription_tests {
    use super::*;

    #[test]
    fn test_billing_statuses() {
        assert!(SubscriptionStatus::Active.is_billing());
        assert!(SubscriptionStatus::PastDue.is_billing());
        assert!(!SubscriptionStatus::Canceled.is_billing());
        assert!(!SubscriptionStatus::Incomplete.is_billing());
    }

    #[test]
    fn test_gateway_status_parsing() {
        assert_eq!(SubscriptionStatus::parse("past_due"), Some(SubscriptionStatus::PastDue));
        assert_eq!(SubscriptionStatus::parse("bogus"), None);
    }

    #[test]
    fn test_yearly_price_normalizes_to_monthly() {
        let yearly = usd(12_000).multiply(BillingInterval::Year.monthly_factor()).unwrap();
        assert_eq!(yearly, usd(1_000));
    }
}

// ============================================================================
// Webhook Signature Tests
// ============================================================================

mod signature_tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;
    const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new("whsec_test", Duration::from_secs(300))
    }

    #[test]
    fn test_signed_payload_verifies() {
        let header = verifier().sign(PAYLOAD, NOW).unwrap();
        assert!(verifier().verify_at(PAYLOAD, &header, NOW + 10).is_ok());
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let header = verifier().sign(PAYLOAD, NOW).unwrap();
        let tampered = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_2"}}}"#;
        assert_eq!(verifier().verify_at(tampered, &header, NOW), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_other_secret_is_rejected() {
        let header = WebhookVerifier::new("whsec_other", Duration::from_secs(300))
            .sign(PAYLOAD, NOW)
            .unwrap();
        assert_eq!(verifier().verify_at(PAYLOAD, &header, NOW), Err(SignatureError::Mismatch));
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let header = verifier().sign(PAYLOAD, NOW).unwrap();
        assert!(matches!(
            verifier().verify_at(PAYLOAD, &header, NOW + 301),
            Err(SignatureError::OutsideTolerance { skew_secs: 301, .. })
        ));
    }

    #[test]
    fn test_any_matching_v1_signature_is_accepted() {
        let good = verifier().sign(PAYLOAD, NOW).unwrap();
        let good_sig = good.split_once("v1=").unwrap().1;
        let header = format!("t={NOW},v1={},v1={good_sig}", "00".repeat(32));
        assert!(verifier().verify_at(PAYLOAD, &header, NOW).is_ok());
    }

    #[test]
    fn test_malformed_headers() {
        assert!(matches!(verifier().verify_at(PAYLOAD, "", NOW), Err(SignatureError::Malformed(_))));
        assert!(matches!(verifier().verify_at(PAYLOAD, "t=abc,v1=00", NOW), Err(SignatureError::Malformed(_))));
        assert!(matches!(verifier().verify_at(PAYLOAD, &format!("t={NOW}"), NOW), Err(SignatureError::Malformed(_))));
    }

    #[test]
    fn test_missing_secret() {
        let verifier = WebhookVerifier::new("", Duration::from_secs(300));
        assert_eq!(verifier.verify_at(PAYLOAD, "t=1,v1=00", NOW), Err(SignatureError::MissingSecret));
    }

    #[test]
    fn test_signature_error_maps_to_invalid_signature() {
        let error: ProcessorError = SignatureError::Mismatch.into();
        assert!(matches!(error, ProcessorError::SignatureInvalid));
    }

    #[test]
    fn test_event_envelope_parses() {
        let event: GatewayEvent = serde_json::from_slice(PAYLOAD).unwrap();
        assert_eq!(event.id.as_str(), "evt_1");
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(event.data.object["id"], "pi_1");
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #[test]
    fn prop_deposit_plus_remaining_is_total(total in 1i64..10_000_000, pct in 1u32..=100) {
        let share = Rate::from_percentage(rust_decimal::Decimal::from(pct));
        let total = usd(total);
        let deposit = payment_amount(&total, PaymentType::Deposit, share).unwrap();
        let remaining = remaining_balance(&total, &deposit).unwrap();
        prop_assert_eq!(deposit.checked_add(&remaining).unwrap(), total);
        prop_assert!(!remaining.is_negative());
    }

    #[test]
    fn prop_fee_is_bounded_by_amount(amount in 0i64..100_000_000) {
        let fee = FeeSchedule::default().fee_for(&usd(amount)).unwrap();
        prop_assert!(fee.minor_units() <= amount);
        prop_assert!(!fee.is_negative());
    }

    #[test]
    fn prop_any_signature_other_than_ours_is_rejected(sig in "[0-9a-f]{64}") {
        let verifier = WebhookVerifier::new("whsec_prop", Duration::from_secs(300));
        let ours = verifier.sign(b"{}", 1_000).unwrap();
        let header = format!("t=1000,v1={sig}");
        prop_assume!(header != ours);
        prop_assert_eq!(verifier.verify_at(b"{}", &header, 1_000), Err(SignatureError::Mismatch));
    }
}
