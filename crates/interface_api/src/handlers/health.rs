//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use core_kernel::HealthCheckResult;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub adapter_id: String,
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<HealthCheckResult> for ComponentHealth {
    fn from(result: HealthCheckResult) -> Self {
        Self {
            adapter_id: result.adapter_id,
            healthy: result.status.is_operational(),
            latency_ms: result.latency_ms,
            message: result.message,
        }
    }
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub version: String,
    pub gateway: ComponentHealth,
    pub store: ComponentHealth,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check (gateway and store)
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let ctx = &state.services.context;
    let (gateway, store) = tokio::join!(ctx.gateway.health_check(), ctx.store.health_check());
    let gateway = ComponentHealth::from(gateway);
    let store = ComponentHealth::from(store);

    let ready = gateway.healthy && store.healthy;
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(ReadinessResponse {
            status: if ready { "ready" } else { "unavailable" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            gateway,
            store,
        }),
    )
}
