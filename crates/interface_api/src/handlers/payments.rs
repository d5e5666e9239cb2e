//! Booking payment, payment status and refund handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use validator::Validate;

use core_kernel::{BookingId, Money, PaymentIntentId, Rate};
use domain_payments::{BookingSummary, CreateBookingPayment, RefundRequest};

use crate::auth::{permissions, require, Claims};
use crate::dto::payments::*;
use crate::dto::ApiResponse;
use crate::{error::ApiError, AppState};

/// Opens a deposit or full payment for a booking
pub async fn create_booking_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CreateBookingPaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BookingPaymentResponse>>), ApiError> {
    require(&claims, permissions::PAYMENT_WRITE)?;
    request.validate()?;

    let currency = request.currency.unwrap_or(state.config.payments.currency);
    let created = state
        .services
        .bookings
        .create_booking_payment(CreateBookingPayment {
            tenant_id: claims.tenant_id,
            booking_id: request.booking_id,
            customer_id: request.customer_id,
            total_amount: Money::from_minor(request.total_amount, currency),
            payment_type: request.payment_type,
            deposit_percentage: request.deposit_percentage.map(Rate::from_percentage),
            idempotency_key: request.idempotency_key,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(BookingPaymentResponse::new(
            created.booking_payment,
            created.client_secret,
            created.attempts,
        ))),
    ))
}

/// Opens the remaining-balance payment after a succeeded deposit
pub async fn process_remaining_balance(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<BookingId>,
    Json(request): Json<RemainingBalanceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BookingPaymentResponse>>), ApiError> {
    require(&claims, permissions::PAYMENT_WRITE)?;
    request.validate()?;

    let created = state
        .services
        .bookings
        .process_remaining_balance(claims.tenant_id, booking_id, request.customer_id, request.idempotency_key)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(BookingPaymentResponse::new(
            created.booking_payment,
            created.client_secret,
            created.attempts,
        ))),
    ))
}

/// Every payment of a booking with paid and outstanding totals
pub async fn booking_summary(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(booking_id): Path<BookingId>,
) -> Result<Json<ApiResponse<BookingSummary>>, ApiError> {
    require(&claims, permissions::PAYMENT_READ)?;
    let summary = state
        .services
        .bookings
        .booking_summary(claims.tenant_id, booking_id)
        .await?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// Current gateway status of a payment
pub async fn get_payment_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(payment_intent_id): Path<PaymentIntentId>,
) -> Result<Json<ApiResponse<PaymentStatusResponse>>, ApiError> {
    require(&claims, permissions::PAYMENT_READ)?;
    let intent = state.services.refunds.get_payment_status(&payment_intent_id).await?;
    if intent.tenant_id != claims.tenant_id {
        return Err(ApiError::NotFound(format!("Payment {payment_intent_id} not found")));
    }
    Ok(Json(ApiResponse::ok(intent.into())))
}

/// Polls the gateway and applies the observed status locally
pub async fn refresh_payment_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(payment_intent_id): Path<PaymentIntentId>,
) -> Result<Json<ApiResponse<PaymentStatusResponse>>, ApiError> {
    require(&claims, permissions::PAYMENT_WRITE)?;
    let intent = state
        .services
        .bookings
        .refresh_payment_status(claims.tenant_id, &payment_intent_id)
        .await?;
    Ok(Json(ApiResponse::ok(intent.into())))
}

/// Validates and issues a refund
pub async fn create_refund(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(payment_intent_id): Path<PaymentIntentId>,
    Json(request): Json<CreateRefundRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RefundResponse>>), ApiError> {
    require(&claims, permissions::REFUND_WRITE)?;
    request.validate()?;

    let outcome = state
        .services
        .refunds
        .process_refund_with_validation(
            claims.tenant_id,
            &payment_intent_id,
            RefundRequest {
                amount: request.amount,
                reason: request.reason,
                initiated_by: claims.sub.clone(),
                metadata: request.metadata,
                idempotency_key: request.idempotency_key,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(RefundResponse {
            refund: outcome.refund,
            fully_refunded: outcome.fully_refunded,
            attempts: outcome.attempts,
        })),
    ))
}
