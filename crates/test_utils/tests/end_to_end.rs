//! End-to-end tests across the payment components
//!
//! Every test runs the real coordinator, refund processor, webhook processor
//! and reconciliation engine against the mock gateway and in-memory store.

use std::future::Future;

use proptest::prelude::*;

use core_kernel::{BookingId, ConnectedAccountId, Currency, Money, PaymentIntentId};
use domain_payments::ports::mock::GatewayOperation;
use domain_payments::refund::PAYMENT_NOT_SUCCEEDED;
use domain_payments::{
    CreateBookingPayment, CustomerInfo, PaymentStatus, PaymentStorePort, PaymentStorePortExt,
    PaymentType, ProcessorError, RefundRequest, RefundStatus, SubscriptionStatus,
};
use domain_reconciliation::{DiscrepancyKind, ReportFormat, ReportRequest};

use test_utils::{
    assert_err, assert_err_variant, assert_money_eq, assert_money_sum_equals, assert_money_zero, assert_ok,
    assert_status, assert_validation_error, currency_strategy, deposit_rate_strategy,
    non_positive_refund_strategy, permanent_error_strategy, transient_error_strategy,
    unrefundable_status_strategy, usd_money_strategy, IdFixtures, MoneyFixtures, PaymentIntentBuilder,
    RateFixtures, RefundBuilder, StringFixtures, TemporalFixtures, TestHarness, WebhookEventBuilder,
    ARTIFACT_BASE_URL,
};

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

fn deposit_request(booking_id: BookingId) -> CreateBookingPayment {
    CreateBookingPayment {
        tenant_id: IdFixtures::tenant_id(),
        booking_id,
        customer_id: IdFixtures::customer_id(),
        total_amount: MoneyFixtures::booking_total(),
        payment_type: PaymentType::Deposit,
        deposit_percentage: Some(RateFixtures::deposit()),
        idempotency_key: None,
    }
}

fn refund_request(amount: Option<i64>) -> RefundRequest {
    RefundRequest {
        amount,
        initiated_by: StringFixtures::staff_user().to_string(),
        ..RefundRequest::default()
    }
}

/// Delivers a signed `payment_intent.succeeded` for `id`
async fn succeed(harness: &TestHarness, id: &PaymentIntentId) {
    let signed = WebhookEventBuilder::payment_succeeded(id).signed();
    assert_ok!(harness.services.webhooks.handle_webhook(&signed.payload, &signed.signature).await);
}

// ============================================================================
// Booking Payment Flow Tests
// ============================================================================

mod booking_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_deposit_then_remaining_balance_then_settled() {
        let harness = TestHarness::new();
        let tenant_id = harness.onboarded_tenant().await;
        let booking_id = IdFixtures::booking_id();
        let bookings = &harness.services.bookings;

        let deposit = assert_ok!(bookings.create_booking_payment(deposit_request(booking_id)).await);
        assert_money_eq(&deposit.booking_payment.amount, &MoneyFixtures::deposit());
        assert_eq!(deposit.attempts, 1);
        assert!(deposit.client_secret.is_some());

        succeed(&harness, &deposit.booking_payment.payment_intent_id).await;

        let remaining = assert_ok!(
            bookings
                .process_remaining_balance(tenant_id, booking_id, IdFixtures::customer_id(), None)
                .await
        );
        assert_money_eq(&remaining.booking_payment.amount, &MoneyFixtures::remaining_balance());
        assert_eq!(remaining.booking_payment.payment_type, PaymentType::RemainingBalance);
        assert_money_sum_equals(
            &[deposit.booking_payment.amount, remaining.booking_payment.amount],
            &MoneyFixtures::booking_total(),
        );

        // A second call while the first is still open is refused
        let pending = bookings
            .process_remaining_balance(tenant_id, booking_id, IdFixtures::customer_id(), None)
            .await;
        assert_err_variant!(pending, ProcessorError::RemainingBalancePending { .. });

        succeed(&harness, &remaining.booking_payment.payment_intent_id).await;

        let settled = bookings
            .process_remaining_balance(tenant_id, booking_id, IdFixtures::customer_id(), None)
            .await;
        assert_err_variant!(settled, ProcessorError::AlreadySettled { .. });

        let summary = assert_ok!(bookings.booking_summary(tenant_id, booking_id).await);
        assert!(summary.fully_paid());
        assert_money_eq(&summary.paid_amount, &MoneyFixtures::booking_total());
    }

    #[tokio::test]
    async fn test_remaining_balance_without_deposit() {
        let harness = TestHarness::new();
        let tenant_id = harness.onboarded_tenant().await;
        let booking_id = IdFixtures::booking_id();
        assert_ok!(harness.services.bookings.create_booking_payment(deposit_request(booking_id)).await);

        let result = harness
            .services
            .bookings
            .process_remaining_balance(tenant_id, booking_id, IdFixtures::customer_id(), None)
            .await;
        assert_err_variant!(result, ProcessorError::NoDepositFound { .. });
    }

    #[tokio::test]
    async fn test_failed_remaining_balance_can_be_retried() {
        let harness = TestHarness::new();
        let tenant_id = harness.onboarded_tenant().await;
        let booking_id = IdFixtures::booking_id();
        let bookings = &harness.services.bookings;

        let deposit = assert_ok!(bookings.create_booking_payment(deposit_request(booking_id)).await);
        succeed(&harness, &deposit.booking_payment.payment_intent_id).await;

        let first = assert_ok!(
            bookings
                .process_remaining_balance(tenant_id, booking_id, IdFixtures::customer_id(), None)
                .await
        );
        let failed = WebhookEventBuilder::payment_failed(&first.booking_payment.payment_intent_id).signed();
        assert_ok!(harness.services.webhooks.handle_webhook(&failed.payload, &failed.signature).await);

        let second = assert_ok!(
            bookings
                .process_remaining_balance(tenant_id, booking_id, IdFixtures::customer_id(), None)
                .await
        );
        assert_ne!(first.booking_payment.payment_intent_id, second.booking_payment.payment_intent_id);
    }

    #[tokio::test]
    async fn test_full_payment_after_deposit_would_overpay() {
        let harness = TestHarness::new();
        harness.onboarded_tenant().await;
        let booking_id = IdFixtures::booking_id();

        let deposit = assert_ok!(harness.services.bookings.create_booking_payment(deposit_request(booking_id)).await);
        succeed(&harness, &deposit.booking_payment.payment_intent_id).await;

        let full = CreateBookingPayment {
            payment_type: PaymentType::FullPayment,
            ..deposit_request(booking_id)
        };
        let error = assert_err!(harness.services.bookings.create_booking_payment(full).await);
        assert!(matches!(error, ProcessorError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_second_deposit_cannot_push_payments_past_total() {
        let harness = TestHarness::new();
        let tenant_id = harness.onboarded_tenant().await;
        let booking_id = IdFixtures::booking_id();
        let bookings = &harness.services.bookings;

        let deposit = assert_ok!(bookings.create_booking_payment(deposit_request(booking_id)).await);
        succeed(&harness, &deposit.booking_payment.payment_intent_id).await;

        let second = bookings.create_booking_payment(deposit_request(booking_id)).await;
        assert_err_variant!(second, ProcessorError::ValidationFailed(_));

        let remaining = assert_ok!(
            bookings
                .process_remaining_balance(tenant_id, booking_id, IdFixtures::customer_id(), None)
                .await
        );
        assert_money_eq(&remaining.booking_payment.amount, &MoneyFixtures::remaining_balance());
        succeed(&harness, &remaining.booking_payment.payment_intent_id).await;

        let summary = assert_ok!(bookings.booking_summary(tenant_id, booking_id).await);
        assert_money_eq(&summary.paid_amount, &MoneyFixtures::booking_total());
        assert_eq!(summary.payments.len(), 2);
    }

    #[tokio::test]
    async fn test_full_payment_refused_while_deposit_is_open() {
        let harness = TestHarness::new();
        harness.onboarded_tenant().await;
        let booking_id = IdFixtures::booking_id();

        assert_ok!(harness.services.bookings.create_booking_payment(deposit_request(booking_id)).await);

        let full = CreateBookingPayment {
            payment_type: PaymentType::FullPayment,
            ..deposit_request(booking_id)
        };
        let result = harness.services.bookings.create_booking_payment(full).await;
        assert_err_variant!(result, ProcessorError::ValidationFailed(_));
        assert_eq!(harness.gateway.calls(GatewayOperation::CreatePaymentIntent).await, 1);
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_see_booking() {
        let harness = TestHarness::new();
        harness.onboarded_tenant().await;
        let booking_id = IdFixtures::booking_id();
        assert_ok!(harness.services.bookings.create_booking_payment(deposit_request(booking_id)).await);

        let result = harness
            .services
            .bookings
            .booking_summary(IdFixtures::other_tenant_id(), booking_id)
            .await;
        assert_err_variant!(result, ProcessorError::NotFound { .. });
    }
}

// ============================================================================
// Retry Behaviour Through the Coordinator
// ============================================================================

mod retry_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_unfailing_gateway_takes_one_attempt() {
        let harness = TestHarness::new();
        harness.onboarded_tenant().await;
        let created = assert_ok!(
            harness
                .services
                .bookings
                .create_booking_payment(deposit_request(BookingId::new()))
                .await
        );
        assert_eq!(created.attempts, 1);
        assert_eq!(harness.gateway.calls(GatewayOperation::CreatePaymentIntent).await, 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn transient_failures_are_absorbed(k in 0u32..3, error in transient_error_strategy()) {
            let attempts = block_on(async {
                let harness = TestHarness::new();
                harness.onboarded_tenant().await;
                harness
                    .gateway
                    .fail_next(GatewayOperation::CreatePaymentIntent, vec![error; k as usize])
                    .await;
                harness
                    .services
                    .bookings
                    .create_booking_payment(deposit_request(BookingId::new()))
                    .await
                    .map(|created| created.attempts)
            });
            prop_assert_eq!(attempts.unwrap(), k + 1);
        }

        #[test]
        fn permanent_failures_are_not_retried(error in permanent_error_strategy()) {
            let (result, calls) = block_on(async {
                let harness = TestHarness::new();
                harness.onboarded_tenant().await;
                harness
                    .gateway
                    .fail_next(GatewayOperation::CreatePaymentIntent, vec![error])
                    .await;
                let result = harness
                    .services
                    .bookings
                    .create_booking_payment(deposit_request(BookingId::new()))
                    .await;
                (result, harness.gateway.calls(GatewayOperation::CreatePaymentIntent).await)
            });
            prop_assert!(matches!(result, Err(ProcessorError::Gateway(_))));
            prop_assert_eq!(calls, 1);
        }

        #[test]
        fn persistent_transient_failures_exhaust_the_budget(error in transient_error_strategy()) {
            let (result, calls) = block_on(async {
                let harness = TestHarness::new();
                harness.onboarded_tenant().await;
                harness
                    .gateway
                    .fail_next(GatewayOperation::CreatePaymentIntent, vec![error; 5])
                    .await;
                let result = harness
                    .services
                    .bookings
                    .create_booking_payment(deposit_request(BookingId::new()))
                    .await;
                (result, harness.gateway.calls(GatewayOperation::CreatePaymentIntent).await)
            });
            match result {
                Err(ProcessorError::Gateway(classified)) => prop_assert!(classified.retryable),
                other => prop_assert!(false, "expected a gateway error, got {:?}", other.map(|c| c.attempts)),
            }
            prop_assert_eq!(calls, 3);
        }

        #[test]
        fn deposit_and_remaining_cover_the_total(total in 10_000i64..10_000_000, rate in deposit_rate_strategy()) {
            let amounts = block_on(async {
                let harness = TestHarness::new();
                let tenant_id = harness.onboarded_tenant().await;
                let booking_id = BookingId::new();
                let deposit = harness
                    .services
                    .bookings
                    .create_booking_payment(CreateBookingPayment {
                        total_amount: Money::from_minor(total, Currency::USD),
                        deposit_percentage: Some(rate),
                        ..deposit_request(booking_id)
                    })
                    .await?;
                succeed(&harness, &deposit.booking_payment.payment_intent_id).await;
                let remaining = harness
                    .services
                    .bookings
                    .process_remaining_balance(tenant_id, booking_id, IdFixtures::customer_id(), None)
                    .await?;
                Ok::<_, ProcessorError>((deposit.booking_payment.amount, remaining.booking_payment.amount))
            });
            let (deposit, remaining) = amounts.unwrap();
            prop_assert!(deposit.is_positive() && remaining.is_positive());
            prop_assert_eq!(deposit.checked_add(&remaining).unwrap(), Money::from_minor(total, Currency::USD));
        }
    }
}

// ============================================================================
// Refund Validation Tests
// ============================================================================

mod refund_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_refund_of_pending_payment_is_rejected_before_the_gateway() {
        let harness = TestHarness::new();
        let tenant_id = harness.onboarded_tenant().await;
        let created = assert_ok!(
            harness
                .services
                .bookings
                .create_booking_payment(deposit_request(IdFixtures::booking_id()))
                .await
        );

        let error = assert_err!(
            harness
                .services
                .refunds
                .process_refund_with_validation(
                    tenant_id,
                    &created.booking_payment.payment_intent_id,
                    refund_request(Some(100)),
                )
                .await
        );

        let errors = assert_validation_error(&error, PAYMENT_NOT_SUCCEEDED);
        assert_eq!(errors, vec!["Payment must be succeeded to process refund".to_string()]);
        assert_eq!(harness.gateway.calls(GatewayOperation::CreateRefund).await, 0);
        assert_eq!(harness.audit.count("refund_rejected").await, 1);
    }

    #[tokio::test]
    async fn test_partial_then_full_refund() {
        let harness = TestHarness::new();
        let tenant_id = harness.onboarded_tenant().await;
        let intent = PaymentIntentBuilder::new().with_status(PaymentStatus::Succeeded).build();
        harness.gateway.insert_intent(intent.clone()).await;
        harness.store.save_payment_intent(&intent).await.unwrap();

        let partial = assert_ok!(
            harness
                .services
                .refunds
                .process_refund_with_validation(tenant_id, &intent.id, refund_request(Some(4_000)))
                .await
        );
        assert!(!partial.fully_refunded);

        let over = harness
            .services
            .refunds
            .process_refund_with_validation(tenant_id, &intent.id, refund_request(Some(6_001)))
            .await;
        assert_err_variant!(over, ProcessorError::ValidationFailed(_));

        let rest = assert_ok!(
            harness
                .services
                .refunds
                .process_refund_with_validation(tenant_id, &intent.id, refund_request(None))
                .await
        );
        assert!(rest.fully_refunded);
        assert_money_eq(&rest.refund.amount, &Money::from_minor(6_000, Currency::USD));

        let stored = harness.store.get_payment_intent(&intent.id).await.unwrap();
        assert_status(&stored, PaymentStatus::Refunded);
        assert_eq!(harness.store.list_refunds(&intent.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_refund_for_other_tenant_is_rejected() {
        let harness = TestHarness::new();
        let intent = PaymentIntentBuilder::new().with_status(PaymentStatus::Succeeded).build();
        harness.gateway.insert_intent(intent.clone()).await;

        let error = assert_err!(
            harness
                .services
                .refunds
                .process_refund_with_validation(IdFixtures::other_tenant_id(), &intent.id, refund_request(None))
                .await
        );
        assert_validation_error(&error, "Payment does not belong to this tenant");
        assert_eq!(harness.gateway.calls(GatewayOperation::CreateRefund).await, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn non_positive_amounts_never_reach_the_gateway(
            amount in non_positive_refund_strategy(),
            status in test_utils::payment_status_strategy(),
        ) {
            let (result, calls) = block_on(async {
                let harness = TestHarness::new();
                let intent = PaymentIntentBuilder::new().with_status(status).build();
                harness.gateway.insert_intent(intent.clone()).await;
                let result = harness
                    .services
                    .refunds
                    .process_refund_with_validation(IdFixtures::tenant_id(), &intent.id, refund_request(Some(amount)))
                    .await;
                (result, harness.gateway.calls(GatewayOperation::CreateRefund).await)
            });
            let error = result.err().unwrap();
            prop_assert!(error.validation_errors().contains(&"Refund amount must be greater than 0".to_string()));
            prop_assert_eq!(calls, 0);
        }

        #[test]
        fn only_succeeded_payments_are_refundable(
            status in unrefundable_status_strategy(),
            amount in proptest::option::of(1i64..20_000),
        ) {
            let (result, calls) = block_on(async {
                let harness = TestHarness::new();
                let intent = PaymentIntentBuilder::new().with_status(status).build();
                harness.gateway.insert_intent(intent.clone()).await;
                let result = harness
                    .services
                    .refunds
                    .process_refund_with_validation(IdFixtures::tenant_id(), &intent.id, refund_request(amount))
                    .await;
                (result, harness.gateway.calls(GatewayOperation::CreateRefund).await)
            });
            let error = result.err().unwrap();
            prop_assert!(error.validation_errors().contains(&PAYMENT_NOT_SUCCEEDED.to_string()));
            prop_assert_eq!(calls, 0);
        }
    }
}

// ============================================================================
// Webhook Flow Tests
// ============================================================================

mod webhook_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_signature_triggers_nothing() {
        let harness = TestHarness::new();
        let intent = PaymentIntentBuilder::new().build();
        harness.store.save_payment_intent(&intent).await.unwrap();

        let forged = WebhookEventBuilder::payment_succeeded(&intent.id).signed_with("whsec_attacker");
        let error = assert_err!(
            harness
                .services
                .webhooks
                .handle_webhook(&forged.payload, &forged.signature)
                .await
        );

        assert!(matches!(error, ProcessorError::SignatureInvalid));
        assert_eq!(error.to_string(), "Invalid signature");
        let stored = harness.store.get_payment_intent(&intent.id).await.unwrap();
        assert_status(&stored, PaymentStatus::Pending);
        assert!(harness.audit.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_replayed_event_is_applied_once() {
        let harness = TestHarness::new();
        let intent = PaymentIntentBuilder::new().build();
        harness.store.save_payment_intent(&intent).await.unwrap();

        let signed = WebhookEventBuilder::payment_succeeded(&intent.id)
            .with_id("evt_replayed")
            .signed();
        let first = assert_ok!(harness.services.webhooks.handle_webhook(&signed.payload, &signed.signature).await);
        let after_first = harness.store.get_payment_intent(&intent.id).await.unwrap();

        let second = assert_ok!(harness.services.webhooks.handle_webhook(&signed.payload, &signed.signature).await);
        let after_second = harness.store.get_payment_intent(&intent.id).await.unwrap();

        assert!(!first.duplicate);
        assert_eq!(first.handlers_triggered, vec!["payment_succeeded".to_string()]);
        assert!(second.duplicate);
        assert!(second.handlers_triggered.is_empty());
        assert_eq!(after_first, after_second);
        assert_eq!(harness.audit.count("payment_status_changed").await, 1);
    }

    #[tokio::test]
    async fn test_same_status_under_new_event_id_is_unchanged() {
        let harness = TestHarness::new();
        let intent = PaymentIntentBuilder::new().build();
        harness.store.save_payment_intent(&intent).await.unwrap();

        succeed(&harness, &intent.id).await;
        let once = harness.store.get_payment_intent(&intent.id).await.unwrap();
        succeed(&harness, &intent.id).await;
        let twice = harness.store.get_payment_intent(&intent.id).await.unwrap();

        assert_status(&twice, PaymentStatus::Succeeded);
        assert_eq!(once.updated_at, twice.updated_at);
    }

    #[tokio::test]
    async fn test_illegal_transition_is_reported_not_applied() {
        let harness = TestHarness::new();
        let intent = PaymentIntentBuilder::new().with_status(PaymentStatus::Failed).build();
        harness.store.save_payment_intent(&intent).await.unwrap();

        let signed = WebhookEventBuilder::payment_succeeded(&intent.id).signed();
        let outcome = assert_ok!(harness.services.webhooks.handle_webhook(&signed.payload, &signed.signature).await);

        assert_eq!(outcome.rejected_transitions, vec![intent.id.clone()]);
        let stored = harness.store.get_payment_intent(&intent.id).await.unwrap();
        assert_status(&stored, PaymentStatus::Failed);
        assert_eq!(harness.audit.count("transition_rejected").await, 1);
    }

    #[tokio::test]
    async fn test_charge_refunded_marks_payment_refunded() {
        let harness = TestHarness::new();
        let intent = PaymentIntentBuilder::new().with_status(PaymentStatus::Succeeded).build();
        harness.store.save_payment_intent(&intent).await.unwrap();

        let signed = WebhookEventBuilder::charge_refunded(&intent.id).signed();
        let outcome = assert_ok!(harness.services.webhooks.handle_webhook(&signed.payload, &signed.signature).await);

        assert_eq!(outcome.handlers_triggered, vec!["charge_refunded".to_string()]);
        let stored = harness.store.get_payment_intent(&intent.id).await.unwrap();
        assert_status(&stored, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn test_account_update_is_audited() {
        let harness = TestHarness::new();
        let account_id = ConnectedAccountId::new("acct_webhook");
        let signed = WebhookEventBuilder::account_updated(&account_id, IdFixtures::tenant_id(), true).signed();

        let outcome = assert_ok!(harness.services.webhooks.handle_webhook(&signed.payload, &signed.signature).await);
        assert_eq!(outcome.handlers_triggered, vec!["account_updated".to_string()]);
        assert_eq!(harness.audit.count("connected_account_changed").await, 1);
    }

    #[tokio::test]
    async fn test_stale_signature_is_rejected() {
        let harness = TestHarness::new();
        let stale = WebhookEventBuilder::payment_succeeded(&PaymentIntentId::new("pi_old"))
            .at(chrono::Utc::now().timestamp() - 3_600)
            .signed();
        let result = harness.services.webhooks.handle_webhook(&stale.payload, &stale.signature).await;
        assert_err_variant!(result, ProcessorError::SignatureInvalid);
    }
}

// ============================================================================
// Subscription Flow Tests
// ============================================================================

mod subscription_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_upgrade_and_cancel() {
        let harness = TestHarness::new();
        harness.with_plans().await;
        let tenant_id = IdFixtures::tenant_id();
        let subscriptions = &harness.services.subscriptions;

        let created = assert_ok!(
            subscriptions
                .create_platform_subscription(
                    tenant_id,
                    IdFixtures::basic_price_id(),
                    CustomerInfo {
                        business_name: StringFixtures::business_name().to_string(),
                        email: Some(StringFixtures::email().to_string()),
                    },
                )
                .await
        );
        assert!(created.customer_created);
        assert_money_eq(&created.subscription.unit_amount, &MoneyFixtures::plan_price());

        let upgraded = assert_ok!(subscriptions.update_platform_subscription(tenant_id, IdFixtures::pro_price_id()).await);
        assert_eq!(upgraded.plan_id, IdFixtures::pro_price_id());
        assert_eq!(upgraded.id, created.subscription.id);

        let canceled = assert_ok!(subscriptions.cancel_platform_subscription(tenant_id, true).await);
        assert!(canceled.cancel_at_period_end);

        let current = assert_ok!(subscriptions.get_platform_subscription(tenant_id).await);
        assert_eq!(current.map(|s| s.id), Some(created.subscription.id));
    }

    fn customer() -> CustomerInfo {
        CustomerInfo {
            business_name: StringFixtures::business_name().to_string(),
            email: Some(StringFixtures::email().to_string()),
        }
    }

    #[tokio::test]
    async fn test_second_live_subscription_is_refused() {
        let harness = TestHarness::new();
        harness.with_plans().await;
        let tenant_id = IdFixtures::tenant_id();
        let subscriptions = &harness.services.subscriptions;

        assert_ok!(
            subscriptions
                .create_platform_subscription(tenant_id, IdFixtures::basic_price_id(), customer())
                .await
        );
        let again = subscriptions
            .create_platform_subscription(tenant_id, IdFixtures::pro_price_id(), customer())
            .await;
        assert_err_variant!(again, ProcessorError::ValidationFailed(_));
        assert_eq!(harness.gateway.calls(GatewayOperation::CreateSubscription).await, 1);
    }

    #[tokio::test]
    async fn test_resubscribe_after_cancel_creates_new_subscription() {
        let harness = TestHarness::new();
        harness.with_plans().await;
        let tenant_id = IdFixtures::tenant_id();
        let subscriptions = &harness.services.subscriptions;

        let first = assert_ok!(
            subscriptions
                .create_platform_subscription(tenant_id, IdFixtures::basic_price_id(), customer())
                .await
        );
        let canceled = assert_ok!(subscriptions.cancel_platform_subscription(tenant_id, false).await);
        assert_eq!(canceled.status, SubscriptionStatus::Canceled);

        let second = assert_ok!(
            subscriptions
                .create_platform_subscription(tenant_id, IdFixtures::basic_price_id(), customer())
                .await
        );
        assert!(!second.customer_created);
        assert_ne!(second.subscription.id, first.subscription.id);
        assert_eq!(second.subscription.status, SubscriptionStatus::Active);

        let current = assert_ok!(subscriptions.get_platform_subscription(tenant_id).await);
        assert_eq!(current.map(|s| s.id), Some(second.subscription.id));
    }

    #[tokio::test]
    async fn test_update_without_subscription_fails() {
        let harness = TestHarness::new();
        harness.with_plans().await;
        harness.onboarded_tenant().await;
        let result = harness
            .services
            .subscriptions
            .update_platform_subscription(IdFixtures::tenant_id(), IdFixtures::pro_price_id())
            .await;
        assert_err_variant!(result, ProcessorError::SubscriptionMissing { .. });
    }
}

// ============================================================================
// Reconciliation and Report Tests
// ============================================================================

mod reconciliation_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_quiet_day_reconciles_to_zero() {
        let harness = TestHarness::new();
        let reconciliation = assert_ok!(
            harness
                .reconciliation()
                .reconcile_payments(IdFixtures::tenant_id(), TemporalFixtures::month_start())
                .await
        );

        assert_eq!(reconciliation.total_processed, 0);
        assert_eq!(reconciliation.summary.successful_payments, 0);
        assert!(reconciliation.summary.total_revenue.is_zero());
        assert!(reconciliation.summary.platform_fees.is_zero());
        assert!(reconciliation.discrepancies.is_empty());
    }

    #[tokio::test]
    async fn test_drift_is_found_and_repaired() {
        let harness = TestHarness::new();
        harness.onboarded_tenant().await;
        let created = assert_ok!(
            harness
                .services
                .bookings
                .create_booking_payment(deposit_request(IdFixtures::booking_id()))
                .await
        );
        let drifted = created.booking_payment.payment_intent_id;
        harness.gateway.set_intent_status(&drifted, PaymentStatus::Succeeded).await;

        let unknown = PaymentIntentBuilder::new().with_status(PaymentStatus::Succeeded).build();
        harness.gateway.insert_intent(unknown.clone()).await;

        let engine = harness.reconciliation();
        let reconciliation = assert_ok!(
            engine
                .reconcile_payments(IdFixtures::tenant_id(), TemporalFixtures::today())
                .await
        );
        assert_eq!(reconciliation.total_processed, 2);
        assert_eq!(reconciliation.discrepancies.len(), 2);
        let kinds: Vec<_> = reconciliation.discrepancies.iter().map(|d| d.kind).collect();
        assert!(kinds.contains(&DiscrepancyKind::StatusMismatch));
        assert!(kinds.contains(&DiscrepancyKind::MissingLocally));

        let repair = assert_ok!(engine.repair_discrepancies(&reconciliation).await);
        assert_eq!(repair.repaired, vec![drifted.clone()]);
        assert_eq!(repair.imported, vec![unknown.id.clone()]);

        let stored = harness.store.get_payment_intent(&drifted).await.unwrap();
        assert_status(&stored, PaymentStatus::Succeeded);

        let rerun = assert_ok!(
            engine
                .reconcile_payments(IdFixtures::tenant_id(), TemporalFixtures::today())
                .await
        );
        assert!(rerun.discrepancies.is_empty());
    }

    #[tokio::test]
    async fn test_report_artifact_round_trip() {
        let harness = TestHarness::new();
        let paid = PaymentIntentBuilder::new()
            .with_status(PaymentStatus::Succeeded)
            .with_application_fee(Money::from_minor(320, Currency::USD))
            .created_at(TemporalFixtures::mid_month())
            .build();
        harness.gateway.insert_intent(paid).await;

        let (generator, _artifacts) = harness.reports();
        let generated = assert_ok!(
            generator
                .generate_payment_report(
                    IdFixtures::tenant_id(),
                    ReportRequest {
                        start_date: TemporalFixtures::month_start(),
                        end_date: TemporalFixtures::month_end(),
                        include_refunds: true,
                        format: ReportFormat::Json,
                    },
                )
                .await
        );

        assert_eq!(generated.report.analytics.total_transactions, 1);
        assert_money_eq(&generated.report.analytics.total_revenue, &MoneyFixtures::booking_total());
        assert_eq!(generated.report.refunds.as_deref().map(<[_]>::len), Some(0));
        assert!(generated.download_url.starts_with(ARTIFACT_BASE_URL));

        let artifact = assert_ok!(
            generator
                .fetch_artifact(IdFixtures::tenant_id(), generated.report.id, ReportFormat::Json)
                .await
        );
        let parsed: serde_json::Value = serde_json::from_slice(&artifact.content).unwrap();
        assert_eq!(parsed["analytics"]["total_transactions"], 1);

        let other = generator
            .fetch_artifact(IdFixtures::other_tenant_id(), generated.report.id, ReportFormat::Json)
            .await;
        assert!(other.is_err());
    }

    #[tokio::test]
    async fn test_analytics_ignores_other_tenants() {
        let harness = TestHarness::new();
        let foreign = PaymentIntentBuilder::new()
            .with_tenant(IdFixtures::other_tenant_id())
            .with_status(PaymentStatus::Succeeded)
            .created_at(TemporalFixtures::mid_month())
            .build();
        harness.gateway.insert_intent(foreign).await;

        let analytics = assert_ok!(
            harness
                .reconciliation()
                .analytics()
                .get_payment_analytics(IdFixtures::tenant_id(), TemporalFixtures::january())
                .await
        );
        assert_eq!(analytics.total_transactions, 0);
        assert!(analytics.total_revenue.is_zero());
    }

    #[tokio::test]
    async fn test_settled_refunds_net_out_of_revenue() {
        let harness = TestHarness::new();
        let paid = PaymentIntentBuilder::new()
            .with_status(PaymentStatus::Succeeded)
            .created_at(TemporalFixtures::mid_month())
            .build();
        harness.gateway.insert_intent(paid.clone()).await;
        harness
            .gateway
            .insert_refund(RefundBuilder::new(&paid, MoneyFixtures::booking_total()).build())
            .await;
        harness
            .gateway
            .insert_refund(
                RefundBuilder::new(&paid, Money::from_minor(500, Currency::USD))
                    .with_status(RefundStatus::Pending)
                    .build(),
            )
            .await;

        let (generator, _artifacts) = harness.reports();
        let generated = assert_ok!(
            generator
                .generate_payment_report(
                    IdFixtures::tenant_id(),
                    ReportRequest {
                        start_date: TemporalFixtures::month_start(),
                        end_date: TemporalFixtures::month_end(),
                        include_refunds: true,
                        format: ReportFormat::Csv,
                    },
                )
                .await
        );

        let analytics = &generated.report.analytics;
        assert_eq!(analytics.successful_transactions, 1);
        assert_money_eq(&analytics.refunded_amount, &MoneyFixtures::booking_total());
        assert_money_zero(&analytics.total_revenue);
        assert_eq!(generated.report.refunds.as_deref().map(<[_]>::len), Some(2));
    }

    #[tokio::test]
    async fn test_refund_after_period_is_not_counted() {
        let harness = TestHarness::new();
        let paid = PaymentIntentBuilder::new()
            .with_status(PaymentStatus::Succeeded)
            .created_at(TemporalFixtures::mid_month())
            .build();
        harness.gateway.insert_intent(paid.clone()).await;
        harness
            .gateway
            .insert_refund(
                RefundBuilder::new(&paid, MoneyFixtures::deposit())
                    .created_at(TemporalFixtures::after_month())
                    .build(),
            )
            .await;

        let analytics = assert_ok!(
            harness
                .reconciliation()
                .analytics()
                .get_payment_analytics(IdFixtures::tenant_id(), TemporalFixtures::january())
                .await
        );
        assert_money_zero(&analytics.refunded_amount);
        assert_money_eq(&analytics.total_revenue, &MoneyFixtures::booking_total());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn refunds_in_other_currencies_leave_revenue_alone(
            amount in usd_money_strategy(),
            currency in currency_strategy().prop_filter("non-USD", |c| *c != Currency::USD),
        ) {
            let (revenue, refunded) = block_on(async {
                let harness = TestHarness::new();
                let paid = PaymentIntentBuilder::new()
                    .with_amount(amount)
                    .with_status(PaymentStatus::Succeeded)
                    .created_at(TemporalFixtures::mid_month())
                    .build();
                harness.gateway.insert_intent(paid.clone()).await;
                harness
                    .gateway
                    .insert_refund(RefundBuilder::new(&paid, Money::from_minor(100, currency)).build())
                    .await;
                let analytics = harness
                    .reconciliation()
                    .analytics()
                    .get_payment_analytics(IdFixtures::tenant_id(), TemporalFixtures::january())
                    .await
                    .unwrap();
                (analytics.total_revenue, analytics.refunded_amount)
            });
            assert_money_eq(&revenue, &amount);
            assert_money_zero(&refunded);
        }
    }
}
