//! Payments Core - API Server Binary
//!
//! # Usage
//!
//! ```bash
//! PAYMENTS_GATEWAY__API_KEY=sk_test_... \
//! PAYMENTS_GATEWAY__WEBHOOK_SECRET=whsec_... \
//! PAYMENTS_DATABASE__URL=postgres://localhost/payments \
//!     cargo run --bin payments-api
//! ```
//!
//! # Environment Variables
//!
//! * `PAYMENTS_SERVER__HOST` / `PAYMENTS_SERVER__PORT` - Bind address (default: 0.0.0.0:8080)
//! * `PAYMENTS_SERVER__JWT_SECRET` - JWT signing secret (required in production)
//! * `PAYMENTS_SERVER__LOG_LEVEL` - Log filter; `RUST_LOG` wins when set
//! * `PAYMENTS_GATEWAY__API_KEY` - Gateway secret key
//! * `PAYMENTS_GATEWAY__WEBHOOK_SECRET` - Webhook signing secret
//! * `PAYMENTS_DATABASE__URL` - PostgreSQL store; in-memory when unset
//! * `PAYMENTS_REPORTS__ARTIFACT_DIR` - Report directory; in-memory when unset

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_payments::adapters::{InMemoryPaymentStore, RestGatewayClient, TracingAuditSink};
use domain_payments::{PaymentServices, PaymentStorePort};
use domain_reconciliation::adapters::{FileArtifactStore, InMemoryArtifactStore};
use domain_reconciliation::ReportArtifactStore;
use infra_db::{create_pool, DatabaseConfig, PostgresPaymentStore};
use interface_api::{config::ApiConfig, create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("invalid PAYMENTS_* configuration")?;

    init_tracing(&config.server.log_level, config.server.log_json);

    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        currency = %config.payments.currency,
        "Starting payments API server"
    );
    if config.gateway.webhook_secret.is_empty() {
        tracing::warn!("no webhook signing secret configured; every webhook will be rejected");
    }

    let gateway = RestGatewayClient::new(config.gateway_client_config())
        .context("failed to build gateway client")?;
    let store = create_store(&config).await?;
    let artifacts = create_artifact_store(&config);

    let services = PaymentServices::new(
        Arc::new(gateway),
        store,
        Arc::new(TracingAuditSink::new()),
        config.payment_settings(),
    );

    let addr: SocketAddr = config.server_addr().parse().context("invalid server address")?;
    let app = create_router(AppState::new(services, artifacts, config));

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber; `RUST_LOG` overrides the configured level
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

async fn create_store(config: &ApiConfig) -> anyhow::Result<Arc<dyn PaymentStorePort>> {
    match &config.database.url {
        Some(url) => {
            let pool = create_pool(
                DatabaseConfig::new(url.clone())
                    .max_connections(config.database.max_connections)
                    .run_migrations(config.database.run_migrations),
            )
            .await
            .context("failed to connect to the payments database")?;
            Ok(Arc::new(PostgresPaymentStore::new(pool)))
        }
        None => {
            tracing::warn!("no database configured; using the in-memory store");
            Ok(Arc::new(InMemoryPaymentStore::new()))
        }
    }
}

fn create_artifact_store(config: &ApiConfig) -> Arc<dyn ReportArtifactStore> {
    let base_url = config.reports.public_base_url.clone();
    match &config.reports.artifact_dir {
        Some(dir) => Arc::new(FileArtifactStore::new(dir, base_url)),
        None => Arc::new(InMemoryArtifactStore::new(base_url)),
    }
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
