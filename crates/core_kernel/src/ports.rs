//! Ports and Adapters Infrastructure
//!
//! Each domain declares its port traits (payment gateway, tenant/booking
//! store, audit sink, report artifact store) on top of [`DomainPort`] and
//! [`HealthCheckable`]; adapters implement them and report failures as
//! [`PortError`](crate::PortError).
//!
//! ```text
//!        booking coordinator, refunds, subscriptions, webhooks
//!                              │
//!                              ▼
//!   PaymentGatewayPort   PaymentStorePort   AuditSinkPort   ReportArtifactStore
//!          ▲                    ▲                 ▲                 ▲
//!    REST client /       Postgres /         tracing /         filesystem /
//!    mock gateway        in-memory          recording         in-memory
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marker for port traits; implementations are shared across tasks
pub trait DomainPort: Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    /// Answering, but slowly or partially
    Degraded,
    Unhealthy,
    Unknown,
}

impl AdapterHealth {
    /// Whether the service can keep taking payments with this adapter
    pub fn is_operational(&self) -> bool {
        matches!(self, AdapterHealth::Healthy | AdapterHealth::Degraded)
    }
}

/// Outcome of probing one adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn healthy(adapter_id: impl Into<String>) -> Self {
        Self::with_status(adapter_id, AdapterHealth::Healthy, None)
    }

    pub fn unhealthy(adapter_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(adapter_id, AdapterHealth::Unhealthy, Some(message.into()))
    }

    fn with_status(adapter_id: impl Into<String>, status: AdapterHealth, message: Option<String>) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status,
            latency_ms: 0,
            message,
            checked_at: Utc::now(),
        }
    }

    /// Records how long the check took
    pub fn measured(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

/// Adapters the readiness endpoint can check
#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}
