//! Platform subscription handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use validator::Validate;

use domain_payments::CustomerInfo;

use crate::auth::{permissions, require, Claims};
use crate::dto::subscriptions::*;
use crate::dto::ApiResponse;
use crate::{error::ApiError, AppState};

/// Subscribes the tenant to a platform price
pub async fn create_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SubscriptionResponse>>), ApiError> {
    require(&claims, permissions::SUBSCRIPTION_WRITE)?;
    request.validate()?;

    let created = state
        .services
        .subscriptions
        .create_platform_subscription(
            claims.tenant_id,
            request.price_id,
            CustomerInfo {
                business_name: request.business_name,
                email: request.email,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(SubscriptionResponse {
            subscription: created.subscription,
            client_secret: created.client_secret,
            customer_created: Some(created.customer_created),
        })),
    ))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<OptionalSubscriptionResponse>>, ApiError> {
    require(&claims, permissions::PAYMENT_READ)?;
    let subscription = state
        .services
        .subscriptions
        .get_platform_subscription(claims.tenant_id)
        .await?;
    Ok(Json(ApiResponse::ok(OptionalSubscriptionResponse { subscription })))
}

/// Moves the subscription to a new price
pub async fn update_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<UpdateSubscriptionRequest>,
) -> Result<Json<ApiResponse<SubscriptionResponse>>, ApiError> {
    require(&claims, permissions::SUBSCRIPTION_WRITE)?;
    let updated = state
        .services
        .subscriptions
        .update_platform_subscription(claims.tenant_id, request.price_id)
        .await?;
    Ok(Json(ApiResponse::ok(updated.into())))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<CancelSubscriptionQuery>,
) -> Result<Json<ApiResponse<SubscriptionResponse>>, ApiError> {
    require(&claims, permissions::SUBSCRIPTION_WRITE)?;
    let canceled = state
        .services
        .subscriptions
        .cancel_platform_subscription(claims.tenant_id, query.at_period_end)
        .await?;
    Ok(Json(ApiResponse::ok(canceled.into())))
}
