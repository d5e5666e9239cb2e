//! Booking payments
//!
//! A booking is paid either in full or as a deposit followed by a remaining
//! balance. Each payment is a separate payment intent created against the
//! tenant's connected account, with the platform fee retained as an
//! application fee.
//!
//! Invariant: for one booking, the succeeded deposit and remaining-balance
//! amounts never add up to more than the booking total. A remaining-balance
//! payment can only be opened once the deposit has succeeded, and only one
//! remaining-balance payment may ever succeed. A deposit or full payment is
//! refused while the booking has any open or paid payment.
//!
//! Concurrent calls for the same booking must be serialized by the caller.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::info;

use core_kernel::{
    BookingId, ConnectedAccountId, CustomerId, Money, MoneyError, PaymentIntentId, Rate, TenantId,
};

use crate::error::{store_error, ProcessorError};
use crate::events::{emit, PaymentEvent, TransitionSource};
use crate::intent::{
    PaymentIntent, PaymentStatus, METADATA_BOOKING_ID, METADATA_CUSTOMER_ID,
    METADATA_PAYMENT_TYPE, METADATA_TENANT_ID, METADATA_TOTAL_AMOUNT,
};
use crate::ports::{CreateIntentRequest, PaymentStorePortExt};
use crate::services::PaymentContext;

/// How a booking payment relates to the booking total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Deposit,
    FullPayment,
    RemainingBalance,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Deposit => "deposit",
            PaymentType::FullPayment => "full_payment",
            PaymentType::RemainingBalance => "remaining_balance",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentType {
    type Err = ProcessorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(PaymentType::Deposit),
            "full_payment" => Ok(PaymentType::FullPayment),
            "remaining_balance" => Ok(PaymentType::RemainingBalance),
            other => Err(ProcessorError::validation(format!("Unknown payment type: {other}"))),
        }
    }
}

/// A booking as known to the payments domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub tenant_id: TenantId,
    pub customer_id: CustomerId,
    pub total_amount: Money,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(id: BookingId, tenant_id: TenantId, customer_id: CustomerId, total_amount: Money) -> Self {
        Self {
            id,
            tenant_id,
            customer_id,
            total_amount,
            created_at: Utc::now(),
        }
    }
}

/// The platform's view of a payment intent scoped to a booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPayment {
    pub payment_intent_id: PaymentIntentId,
    pub booking_id: BookingId,
    pub customer_id: CustomerId,
    pub tenant_id: TenantId,
    pub payment_type: PaymentType,
    pub amount: Money,
    /// Booking total when this payment was opened
    pub total_amount: Money,
    pub application_fee: Money,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Platform fee: a percentage of the amount plus a flat component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub percentage: Rate,
    /// Flat component in minor units of the payment currency
    pub flat_minor_units: i64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            percentage: Rate::from_percentage(dec!(2.9)),
            flat_minor_units: 30,
        }
    }
}

impl FeeSchedule {
    /// Fee for `amount`, never more than the amount itself
    pub fn fee_for(&self, amount: &Money) -> Result<Money, MoneyError> {
        let variable = self.percentage.apply(amount)?;
        let fee = variable.checked_add(&Money::from_minor(self.flat_minor_units, amount.currency()))?;
        if fee.minor_units() > amount.minor_units() {
            Ok(*amount)
        } else {
            Ok(fee)
        }
    }
}

/// Coordinator settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingSettings {
    pub fees: FeeSchedule,
    /// Deposit share used when a request does not name one
    pub default_deposit: Rate,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            default_deposit: Rate::new(dec!(0.30)),
        }
    }
}

/// Request to open a deposit or full payment for a booking
#[derive(Debug, Clone)]
pub struct CreateBookingPayment {
    pub tenant_id: TenantId,
    pub booking_id: BookingId,
    pub customer_id: CustomerId,
    pub total_amount: Money,
    pub payment_type: PaymentType,
    /// Share of the total collected as deposit, in (0, 1]
    pub deposit_percentage: Option<Rate>,
    pub idempotency_key: Option<String>,
}

/// A booking payment that was opened at the gateway
#[derive(Debug, Clone)]
pub struct BookingPaymentCreated {
    pub booking_payment: BookingPayment,
    pub client_secret: Option<String>,
    /// Gateway attempts spent creating the intent
    pub attempts: u32,
}

/// All payments of a booking with paid and outstanding totals
#[derive(Debug, Clone, Serialize)]
pub struct BookingSummary {
    pub booking_id: BookingId,
    pub total_amount: Money,
    pub paid_amount: Money,
    pub outstanding_amount: Money,
    pub payments: Vec<BookingPayment>,
}

impl BookingSummary {
    pub fn fully_paid(&self) -> bool {
        !self.outstanding_amount.is_positive()
    }
}

/// Amount charged for a deposit or full payment
pub fn payment_amount(total: &Money, payment_type: PaymentType, deposit: Rate) -> Result<Money, ProcessorError> {
    match payment_type {
        PaymentType::Deposit => Ok(deposit.apply(total)?),
        PaymentType::FullPayment => Ok(*total),
        PaymentType::RemainingBalance => Err(ProcessorError::validation(
            "Remaining balance payments are opened from a succeeded deposit",
        )),
    }
}

/// What is left to collect once `paid` has succeeded against `total`
pub fn remaining_balance(total: &Money, paid: &Money) -> Result<Money, MoneyError> {
    total.checked_sub(paid)
}

fn succeeded_total(payments: &[BookingPayment], total: &Money) -> Result<Money, MoneyError> {
    Money::sum(
        payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Succeeded)
            .map(|p| &p.amount),
        total.currency(),
    )
}

/// A deposit or full payment opens a booking's payment plan, so it is
/// refused while any payment of the booking is still open or already paid
fn check_can_open(
    booking_id: BookingId,
    payment_type: PaymentType,
    existing: &[BookingPayment],
) -> Result<(), ProcessorError> {
    if payment_type == PaymentType::RemainingBalance {
        return Ok(());
    }
    let live = existing
        .iter()
        .find(|p| matches!(p.status, PaymentStatus::Pending | PaymentStatus::Succeeded));
    match live {
        Some(payment) => Err(ProcessorError::validation(format!(
            "Booking {} already has a {} {} payment {}",
            booking_id, payment.status, payment.payment_type, payment.payment_intent_id
        ))),
        None => Ok(()),
    }
}

/// Creates and tracks booking payments
pub struct BookingPaymentCoordinator {
    ctx: PaymentContext,
    settings: BookingSettings,
}

impl BookingPaymentCoordinator {
    pub fn new(ctx: PaymentContext, settings: BookingSettings) -> Self {
        Self { ctx, settings }
    }

    pub fn settings(&self) -> &BookingSettings {
        &self.settings
    }

    /// Opens a deposit or full payment for a booking
    pub async fn create_booking_payment(
        &self,
        request: CreateBookingPayment,
    ) -> Result<BookingPaymentCreated, ProcessorError> {
        let deposit_rate = request.deposit_percentage.unwrap_or(self.settings.default_deposit);

        let mut errors = Vec::new();
        if !request.total_amount.is_positive() {
            errors.push("Total amount must be greater than 0".to_string());
        }
        if request.payment_type == PaymentType::RemainingBalance {
            errors.push("Remaining balance payments are opened from a succeeded deposit".to_string());
        }
        if request.payment_type == PaymentType::Deposit && !deposit_rate.is_partial_share() {
            errors.push("Deposit percentage must be greater than 0 and at most 100".to_string());
        }
        if !errors.is_empty() {
            return Err(ProcessorError::ValidationFailed(errors));
        }

        let destination = self.destination_for(request.tenant_id).await?;
        let booking = self.ensure_booking(&request).await?;
        let existing = self.ctx.store.list_booking_payments(booking.id).await?;

        check_can_open(booking.id, request.payment_type, &existing)?;

        let amount = payment_amount(&booking.total_amount, request.payment_type, deposit_rate)?;
        let already_paid = succeeded_total(&existing, &booking.total_amount)?;
        if already_paid.checked_add(&amount)?.minor_units() > booking.total_amount.minor_units() {
            return Err(ProcessorError::validation(format!(
                "Payment of {} would exceed the booking total of {} ({} already paid)",
                amount, booking.total_amount, already_paid
            )));
        }

        self.open_payment(
            &booking,
            request.customer_id,
            destination,
            request.payment_type,
            amount,
            request.idempotency_key,
            &existing,
        )
        .await
    }

    /// Opens the remaining-balance payment after a succeeded deposit
    pub async fn process_remaining_balance(
        &self,
        tenant_id: TenantId,
        booking_id: BookingId,
        customer_id: CustomerId,
        idempotency_key: Option<String>,
    ) -> Result<BookingPaymentCreated, ProcessorError> {
        let booking = self.owned_booking(tenant_id, booking_id).await?;
        let payments = self.ctx.store.list_booking_payments(booking_id).await?;

        let has_deposit = payments
            .iter()
            .any(|p| p.payment_type == PaymentType::Deposit && p.status == PaymentStatus::Succeeded);
        if !has_deposit {
            return Err(ProcessorError::NoDepositFound { booking_id });
        }

        let remaining_payments = payments
            .iter()
            .filter(|p| p.payment_type == PaymentType::RemainingBalance);
        for payment in remaining_payments {
            match payment.status {
                PaymentStatus::Succeeded | PaymentStatus::Refunded => {
                    return Err(ProcessorError::AlreadySettled { booking_id });
                }
                PaymentStatus::Pending => {
                    return Err(ProcessorError::RemainingBalancePending {
                        booking_id,
                        payment_intent_id: payment.payment_intent_id.clone(),
                    });
                }
                PaymentStatus::Failed => {}
            }
        }

        let paid = succeeded_total(&payments, &booking.total_amount)?;
        let remaining = remaining_balance(&booking.total_amount, &paid)?;
        if !remaining.is_positive() {
            return Err(ProcessorError::AlreadySettled { booking_id });
        }

        let destination = self.destination_for(tenant_id).await?;
        self.open_payment(
            &booking,
            customer_id,
            destination,
            PaymentType::RemainingBalance,
            remaining,
            idempotency_key,
            &payments,
        )
        .await
    }

    /// Polls the gateway for an intent and applies the observed status
    pub async fn refresh_payment_status(
        &self,
        tenant_id: TenantId,
        payment_intent_id: &PaymentIntentId,
    ) -> Result<PaymentIntent, ProcessorError> {
        let local = self
            .ctx
            .store
            .get_payment_intent(payment_intent_id)
            .await
            .map_err(store_error)?;
        if local.tenant_id != tenant_id {
            return Err(ProcessorError::not_found("PaymentIntent", payment_intent_id));
        }

        let remote = self
            .ctx
            .retry
            .execute_with_retry("retrieve_payment_intent", || {
                self.ctx.gateway.retrieve_payment_intent(payment_intent_id)
            })
            .await
            .into_result()?;

        self.ctx
            .lifecycle
            .apply_status(payment_intent_id, remote.status, TransitionSource::Polling)
            .await?;

        Ok(self.ctx.store.get_payment_intent(payment_intent_id).await?)
    }

    /// Every payment of a booking with paid and outstanding totals
    pub async fn booking_summary(
        &self,
        tenant_id: TenantId,
        booking_id: BookingId,
    ) -> Result<BookingSummary, ProcessorError> {
        let booking = self.owned_booking(tenant_id, booking_id).await?;
        let payments = self.ctx.store.list_booking_payments(booking_id).await?;

        let paid_amount = succeeded_total(&payments, &booking.total_amount)?;
        let outstanding = booking.total_amount.checked_sub(&paid_amount)?;
        let outstanding_amount = if outstanding.is_negative() {
            Money::zero(booking.total_amount.currency())
        } else {
            outstanding
        };

        Ok(BookingSummary {
            booking_id,
            total_amount: booking.total_amount,
            paid_amount,
            outstanding_amount,
            payments,
        })
    }

    async fn destination_for(&self, tenant_id: TenantId) -> Result<ConnectedAccountId, ProcessorError> {
        let tenant = self.ctx.store.get_tenant(tenant_id).await.map_err(store_error)?;
        tenant
            .connected_account_id
            .ok_or(ProcessorError::ConnectedAccountMissing { tenant_id })
    }

    async fn owned_booking(&self, tenant_id: TenantId, booking_id: BookingId) -> Result<Booking, ProcessorError> {
        let booking = self.ctx.store.get_booking(booking_id).await.map_err(store_error)?;
        if booking.tenant_id != tenant_id {
            return Err(ProcessorError::not_found("Booking", booking_id));
        }
        Ok(booking)
    }

    async fn ensure_booking(&self, request: &CreateBookingPayment) -> Result<Booking, ProcessorError> {
        match self.ctx.store.get_booking(request.booking_id).await {
            Ok(booking) => {
                if booking.tenant_id != request.tenant_id {
                    return Err(ProcessorError::not_found("Booking", request.booking_id));
                }
                if booking.total_amount != request.total_amount {
                    return Err(ProcessorError::validation(format!(
                        "Total amount {} does not match the booking total {}",
                        request.total_amount, booking.total_amount
                    )));
                }
                Ok(booking)
            }
            Err(e) if e.is_not_found() => {
                let booking = Booking::new(
                    request.booking_id,
                    request.tenant_id,
                    request.customer_id,
                    request.total_amount,
                );
                self.ctx.store.save_booking(&booking).await?;
                Ok(booking)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn open_payment(
        &self,
        booking: &Booking,
        customer_id: CustomerId,
        destination: ConnectedAccountId,
        payment_type: PaymentType,
        amount: Money,
        idempotency_key: Option<String>,
        existing: &[BookingPayment],
    ) -> Result<BookingPaymentCreated, ProcessorError> {
        let application_fee = self.settings.fees.fee_for(&amount)?;

        let mut metadata = HashMap::new();
        metadata.insert(METADATA_BOOKING_ID.to_string(), booking.id.to_string());
        metadata.insert(METADATA_TENANT_ID.to_string(), booking.tenant_id.to_string());
        metadata.insert(METADATA_CUSTOMER_ID.to_string(), customer_id.to_string());
        metadata.insert(METADATA_PAYMENT_TYPE.to_string(), payment_type.as_str().to_string());
        metadata.insert(
            METADATA_TOTAL_AMOUNT.to_string(),
            booking.total_amount.minor_units().to_string(),
        );

        let sequence = existing.iter().filter(|p| p.payment_type == payment_type).count() + 1;
        let idempotency_key = idempotency_key.unwrap_or_else(|| {
            format!("booking-{}-{}-{}", booking.id.as_uuid(), payment_type.as_str(), sequence)
        });

        let request = CreateIntentRequest {
            tenant_id: booking.tenant_id,
            amount,
            destination: Some(destination),
            application_fee: Some(application_fee),
            metadata,
            idempotency_key: Some(idempotency_key),
        };

        let outcome = self
            .ctx
            .retry
            .execute_with_retry("create_payment_intent", || {
                self.ctx.gateway.create_payment_intent(request.clone())
            })
            .await;
        let attempts = outcome.attempts;

        let intent = match outcome.result {
            Ok(intent) => intent,
            Err(error) => {
                emit(
                    self.ctx.audit.as_ref(),
                    PaymentEvent::PaymentIntentFailed {
                        tenant_id: booking.tenant_id,
                        booking_id: Some(booking.id),
                        error_type: error.error_type.to_string(),
                        code: error.code.clone(),
                        attempts,
                    },
                )
                .await;
                return Err(error.into());
            }
        };

        self.ctx.store.save_payment_intent(&intent).await?;

        let booking_payment = BookingPayment {
            payment_intent_id: intent.id.clone(),
            booking_id: booking.id,
            customer_id,
            tenant_id: booking.tenant_id,
            payment_type,
            amount,
            total_amount: booking.total_amount,
            application_fee,
            status: intent.status,
            created_at: intent.created_at,
            updated_at: intent.updated_at,
        };
        self.ctx.store.save_booking_payment(&booking_payment).await?;

        info!(
            tenant_id = %booking.tenant_id,
            booking_id = %booking.id,
            payment_intent_id = %intent.id,
            payment_type = %payment_type,
            amount = amount.minor_units(),
            attempts,
            "booking payment opened"
        );
        emit(
            self.ctx.audit.as_ref(),
            PaymentEvent::PaymentIntentCreated {
                tenant_id: booking.tenant_id,
                payment_intent_id: intent.id.clone(),
                booking_id: Some(booking.id),
                payment_type: Some(payment_type),
                amount,
                application_fee: Some(application_fee),
                attempts,
            },
        )
        .await;

        Ok(BookingPaymentCreated {
            booking_payment,
            client_secret: intent.client_secret,
            attempts,
        })
    }
}
