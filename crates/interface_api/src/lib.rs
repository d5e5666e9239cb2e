//! HTTP API Layer
//!
//! This crate provides the REST API for the payments core using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers per area (payments, subscriptions,
//!   accounts, reports, webhooks, health)
//! - **Middleware**: Authentication, tracing, audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: Consistent `{ success: false, .. }` error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let state = AppState::new(services, artifacts, config);
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use domain_payments::PaymentServices;
use domain_reconciliation::{ReconciliationEngine, ReportArtifactStore, ReportGenerator};

use crate::config::ApiConfig;
use crate::handlers::{accounts, health, payments, reports, subscriptions, webhooks};
use crate::middleware::{audit_middleware, auth_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<PaymentServices>,
    pub reports: Arc<ReportGenerator>,
    pub reconciliation: ReconciliationEngine,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(services: PaymentServices, artifacts: Arc<dyn ReportArtifactStore>, config: ApiConfig) -> Self {
        let reconciliation = ReconciliationEngine::new(services.context.clone(), config.payments.currency);
        let reports = ReportGenerator::new(reconciliation.analytics().clone(), artifacts);
        Self {
            services: Arc::new(services),
            reports: Arc::new(reports),
            reconciliation,
            config: Arc::new(config),
        }
    }
}

/// Creates the main API router
///
/// Health checks and the gateway webhook are public; everything under
/// `/api/v1` needs a bearer token and acts for the token's tenant.
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/webhooks/gateway", post(webhooks::handle_gateway_webhook));

    let booking_routes = Router::new()
        .route("/payments", post(payments::create_booking_payment))
        .route("/:booking_id/remaining-balance", post(payments::process_remaining_balance))
        .route("/:booking_id/summary", get(payments::booking_summary));

    let payment_routes = Router::new()
        .route("/:payment_intent_id", get(payments::get_payment_status))
        .route("/:payment_intent_id/refresh", post(payments::refresh_payment_status))
        .route("/:payment_intent_id/refunds", post(payments::create_refund));

    let subscription_routes = Router::new().route(
        "/",
        post(subscriptions::create_subscription)
            .get(subscriptions::get_subscription)
            .put(subscriptions::update_subscription)
            .delete(subscriptions::cancel_subscription),
    );

    let account_routes = Router::new()
        .route("/", post(accounts::create_account).get(accounts::get_account_status))
        .route("/onboarding-link", post(accounts::refresh_onboarding_link));

    let report_routes = Router::new()
        .route("/", post(reports::generate_report))
        .route("/:tenant_id/:file_name", get(reports::download_report));

    let api_routes = Router::new()
        .nest("/bookings", booking_routes)
        .nest("/payments", payment_routes)
        .nest("/subscriptions", subscription_routes)
        .nest("/accounts", account_routes)
        .nest("/reports", report_routes)
        .route("/analytics", get(reports::get_payment_analytics))
        .route("/reconciliations", post(reports::reconcile_payments))
        .layer(axum_middleware::from_fn(audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
