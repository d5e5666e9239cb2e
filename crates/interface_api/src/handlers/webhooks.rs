//! Gateway webhook endpoint
//!
//! Takes the raw body so the signature is checked over the exact bytes the
//! gateway signed. Accepted and ignored events both answer 200; a bad
//! signature answers 400 without the payload being interpreted.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::info;

use domain_payments::ProcessorError;

use crate::{error::ApiError, AppState};

/// Header carrying `t=<unix>,v1=<hex>` signatures
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub webhooks_triggered: Vec<String>,
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookResponse {
    fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            event: None,
            webhooks_triggered: Vec::new(),
            duplicate: false,
            error: Some(error.into()),
        }
    }
}

pub async fn handle_gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    match state.services.webhooks.handle_webhook(&body, signature).await {
        Ok(outcome) => {
            info!(
                event_id = %outcome.event_id,
                event_type = %outcome.event_type,
                handlers = ?outcome.handlers_triggered,
                duplicate = outcome.duplicate,
                "webhook accepted"
            );
            let response = WebhookResponse {
                success: true,
                event: Some(outcome.event_type),
                webhooks_triggered: outcome.handlers_triggered,
                duplicate: outcome.duplicate,
                error: None,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(ProcessorError::SignatureInvalid) => (
            StatusCode::BAD_REQUEST,
            Json(WebhookResponse::rejected("Invalid signature")),
        )
            .into_response(),
        Err(ProcessorError::MalformedPayload(message)) => {
            (StatusCode::BAD_REQUEST, Json(WebhookResponse::rejected(message))).into_response()
        }
        // Anything else is answered non-2xx so the gateway redelivers
        Err(e) => ApiError::from(e).into_response(),
    }
}
