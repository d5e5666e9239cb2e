//! Connected account handlers

use axum::{extract::State, http::StatusCode, Extension, Json};
use validator::Validate;

use domain_payments::BusinessInfo;

use crate::auth::{permissions, require, Claims};
use crate::dto::accounts::*;
use crate::dto::ApiResponse;
use crate::{error::ApiError, AppState};

/// Onboards the tenant as a sub-merchant
pub async fn create_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AccountCreatedResponse>>), ApiError> {
    require(&claims, permissions::ACCOUNT_WRITE)?;
    request.validate()?;

    let created = state
        .services
        .accounts
        .create_connected_account(
            claims.tenant_id,
            BusinessInfo {
                business_name: request.business_name,
                email: request.email,
                country: request.country,
                business_type: request.business_type,
            },
        )
        .await?;

    let status = if created.reused { StatusCode::OK } else { StatusCode::CREATED };
    Ok((
        status,
        Json(ApiResponse::ok(AccountCreatedResponse {
            account: created.account.status(),
            onboarding_url: created.onboarding_url,
            reused: created.reused,
        })),
    ))
}

pub async fn get_account_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<AccountStatusResponse>>, ApiError> {
    require(&claims, permissions::PAYMENT_READ)?;
    let account = state
        .services
        .accounts
        .get_connected_account_status(claims.tenant_id)
        .await?;
    Ok(Json(ApiResponse::ok(AccountStatusResponse { account })))
}

pub async fn refresh_onboarding_link(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<OnboardingLinkResponse>>, ApiError> {
    require(&claims, permissions::ACCOUNT_WRITE)?;
    let link = state
        .services
        .accounts
        .refresh_onboarding_link(claims.tenant_id)
        .await?;
    Ok(Json(ApiResponse::ok(OnboardingLinkResponse { link })))
}
