//! API error handling
//!
//! Every failure is rendered as
//! `{ "success": false, "error": <code>, "message": .., "details": [..] }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use core_kernel::PortError;
use domain_payments::ProcessorError;
use domain_reconciliation::ReconciliationError;

use crate::auth::AuthError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),

    #[error("Validation error")]
    Validation(Vec<String>),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

fn store_status(error: &PortError) -> StatusCode {
    match error {
        PortError::NotFound { .. } => StatusCode::NOT_FOUND,
        PortError::Conflict { .. } => StatusCode::CONFLICT,
        PortError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        PortError::Decode { .. } | PortError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn processor_status(error: &ProcessorError) -> StatusCode {
    match error {
        ProcessorError::ValidationFailed(_) | ProcessorError::Money(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ProcessorError::SignatureInvalid | ProcessorError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        ProcessorError::NotFound { .. } => StatusCode::NOT_FOUND,
        ProcessorError::NoDepositFound { .. }
        | ProcessorError::AlreadySettled { .. }
        | ProcessorError::RemainingBalancePending { .. }
        | ProcessorError::InvalidStatusTransition { .. }
        | ProcessorError::ConnectedAccountMissing { .. }
        | ProcessorError::SubscriptionMissing { .. } => StatusCode::CONFLICT,
        ProcessorError::Gateway(_) => StatusCode::BAD_GATEWAY,
        ProcessorError::Store(e) => store_status(e),
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Processor(e) => processor_status(e),
            ApiError::Reconciliation(e) => match e {
                ReconciliationError::Gateway(_) => StatusCode::BAD_GATEWAY,
                ReconciliationError::Store(e) => store_status(e),
                ReconciliationError::Period(_)
                | ReconciliationError::Money(_)
                | ReconciliationError::UnsupportedFormat(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ReconciliationError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
                ReconciliationError::Repair(e) => processor_status(e),
            },
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Processor(e) => e.code(),
            ApiError::Reconciliation(e) => e.code(),
            ApiError::Validation(_) => "validation_failed",
            ApiError::Internal(_) => "internal_error",
        }
    }

    fn details(&self) -> Vec<String> {
        match self {
            ApiError::Validation(details) => details.clone(),
            ApiError::Processor(e) => e.validation_errors().to_vec(),
            ApiError::Reconciliation(ReconciliationError::Repair(e)) => e.validation_errors().to_vec(),
            _ => Vec::new(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "request failed");
        }

        let body = ErrorResponse {
            success: false,
            error: self.code().to_string(),
            message: self.to_string(),
            details: self.details(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingPermission(p) => ApiError::Forbidden(format!("missing permission {p}")),
            AuthError::InvalidToken | AuthError::TokenExpired => ApiError::Unauthorized,
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => format!("{field}: {message}"),
                    None => format!("{field}: {}", e.code),
                })
            })
            .collect();
        details.sort();
        ApiError::Validation(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::BookingId;

    #[test]
    fn test_validation_failures_are_422() {
        let err = ApiError::from(ProcessorError::ValidationFailed(vec![
            "Payment must be succeeded to process refund".to_string(),
        ]));
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.details(), vec!["Payment must be succeeded to process refund".to_string()]);
    }

    #[test]
    fn test_domain_conflicts_are_409() {
        let err = ApiError::from(ProcessorError::AlreadySettled { booking_id: BookingId::new() });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "already_settled");
    }

    #[test]
    fn test_signature_failure_is_400() {
        let err = ApiError::from(ProcessorError::SignatureInvalid);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Invalid signature");
    }

    #[test]
    fn test_store_not_found_is_404() {
        let err = ApiError::from(ProcessorError::Store(PortError::not_found("Booking", "BKG-1")));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
