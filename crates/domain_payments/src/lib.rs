//! Payments Domain
//!
//! Executes charges, deposits, remaining-balance collections, refunds and
//! subscription billing against an external payment gateway, and keeps the
//! local payment state consistent with it.
//!
//! # Components
//!
//! - **Retry Executor**: classifies gateway failures and retries transient ones
//! - **Booking Payment Coordinator**: deposits, full payments and remaining balances
//! - **Refund Processor**: validates refunds before they reach the gateway
//! - **Subscription Manager**: platform subscriptions for tenants
//! - **Connected-Account Manager**: tenant sub-merchant onboarding
//! - **Webhook Processor**: verifies and dispatches gateway events
//!
//! # Payment Lifecycle
//!
//! ```text
//! pending -> succeeded -> refunded
//!        \-> failed
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_payments::{CreateBookingPayment, PaymentServices, PaymentType};
//!
//! let services = PaymentServices::new(gateway, store, audit, settings);
//! let created = services.bookings.create_booking_payment(CreateBookingPayment {
//!     tenant_id,
//!     booking_id,
//!     customer_id,
//!     total_amount: Money::from_minor(10_000, Currency::USD),
//!     payment_type: PaymentType::Deposit,
//!     deposit_percentage: None,
//!     idempotency_key: None,
//! }).await?;
//! ```

pub mod adapters;
pub mod booking;
pub mod connected_account;
pub mod error;
pub mod events;
pub mod intent;
pub mod ports;
pub mod refund;
pub mod retry;
pub mod services;
pub mod subscription;
pub mod tenant;
pub mod webhook;

pub use booking::{
    payment_amount, remaining_balance, Booking, BookingPayment, BookingPaymentCoordinator,
    BookingPaymentCreated, BookingSettings, BookingSummary, CreateBookingPayment, FeeSchedule,
    PaymentType,
};
pub use connected_account::{
    AccountLink, BusinessInfo, ConnectedAccount, ConnectedAccountCreated, ConnectedAccountManager,
    ConnectedAccountStatus, OnboardingUrls,
};
pub use error::{classify_error, GatewayError, PaymentError, PaymentErrorType, ProcessorError};
pub use events::{AuditRecord, PaymentEvent, SubscriptionAction, TransitionSource};
pub use intent::{PaymentIntent, PaymentLifecycle, PaymentStatus, TransitionOutcome};
pub use ports::{AuditSinkPort, GatewayQuery, PaymentGatewayPort, PaymentStorePort, PaymentStorePortExt};
pub use refund::{Refund, RefundOutcome, RefundProcessor, RefundReason, RefundRequest, RefundStatus};
pub use retry::{
    BackoffPolicy, ExponentialBackoff, FixedBackoff, NoBackoff, RetryExecutor, RetryOptions,
    RetryOutcome,
};
pub use services::{PaymentContext, PaymentServices, PaymentSettings};
pub use subscription::{
    BillingInterval, CustomerInfo, GatewayCustomer, Subscription, SubscriptionCreated,
    SubscriptionManager, SubscriptionStatus,
};
pub use tenant::Tenant;
pub use webhook::{GatewayEvent, SignatureError, WebhookOutcome, WebhookProcessor, WebhookVerifier};
