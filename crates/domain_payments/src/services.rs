//! Payments domain services
//!
//! [`PaymentContext`] bundles the ports, the retry executor and the payment
//! lifecycle that every component shares. [`PaymentServices`] builds all of
//! the components from one context and one set of settings.

use std::sync::Arc;
use std::time::Duration;

use crate::booking::{BookingPaymentCoordinator, BookingSettings};
use crate::connected_account::{ConnectedAccountManager, OnboardingUrls};
use crate::intent::PaymentLifecycle;
use crate::ports::{AuditSinkPort, PaymentGatewayPort, PaymentStorePort};
use crate::refund::RefundProcessor;
use crate::retry::{RetryExecutor, RetryOptions};
use crate::subscription::SubscriptionManager;
use crate::webhook::{WebhookProcessor, WebhookVerifier, DEFAULT_TOLERANCE};

/// Shared dependencies of the payment components
#[derive(Clone)]
pub struct PaymentContext {
    pub gateway: Arc<dyn PaymentGatewayPort>,
    pub store: Arc<dyn PaymentStorePort>,
    pub audit: Arc<dyn AuditSinkPort>,
    pub retry: RetryExecutor,
    pub lifecycle: PaymentLifecycle,
}

impl PaymentContext {
    pub fn new(
        gateway: Arc<dyn PaymentGatewayPort>,
        store: Arc<dyn PaymentStorePort>,
        audit: Arc<dyn AuditSinkPort>,
        retry: RetryOptions,
    ) -> Self {
        let lifecycle = PaymentLifecycle::new(store.clone(), audit.clone());
        Self {
            gateway,
            store,
            audit,
            retry: RetryExecutor::new(retry),
            lifecycle,
        }
    }
}

/// Settings for the payment components
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub booking: BookingSettings,
    pub retry: RetryOptions,
    pub webhook_secret: String,
    pub webhook_tolerance: Duration,
    pub onboarding: OnboardingUrls,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            booking: BookingSettings::default(),
            retry: RetryOptions::default(),
            webhook_secret: String::new(),
            webhook_tolerance: DEFAULT_TOLERANCE,
            onboarding: OnboardingUrls::default(),
        }
    }
}

/// Every payment component, built over one context
pub struct PaymentServices {
    pub context: PaymentContext,
    pub bookings: BookingPaymentCoordinator,
    pub refunds: RefundProcessor,
    pub subscriptions: SubscriptionManager,
    pub accounts: ConnectedAccountManager,
    pub webhooks: WebhookProcessor,
}

impl PaymentServices {
    pub fn new(
        gateway: Arc<dyn PaymentGatewayPort>,
        store: Arc<dyn PaymentStorePort>,
        audit: Arc<dyn AuditSinkPort>,
        settings: PaymentSettings,
    ) -> Self {
        let context = PaymentContext::new(gateway, store, audit, settings.retry);
        Self {
            bookings: BookingPaymentCoordinator::new(context.clone(), settings.booking),
            refunds: RefundProcessor::new(context.clone()),
            subscriptions: SubscriptionManager::new(context.clone()),
            accounts: ConnectedAccountManager::new(context.clone(), settings.onboarding),
            webhooks: WebhookProcessor::new(
                context.clone(),
                WebhookVerifier::new(settings.webhook_secret, settings.webhook_tolerance),
            ),
            context,
        }
    }

    pub fn lifecycle(&self) -> &PaymentLifecycle {
        &self.context.lifecycle
    }
}
