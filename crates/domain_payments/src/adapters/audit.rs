//! Audit sink that writes structured log events

use async_trait::async_trait;
use tracing::info;

use core_kernel::{DomainPort, PortError};

use crate::events::AuditRecord;
use crate::ports::AuditSinkPort;

/// Publishes audit records as `tracing` events on the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

impl DomainPort for TracingAuditSink {}

#[async_trait]
impl AuditSinkPort for TracingAuditSink {
    async fn publish(&self, record: AuditRecord) -> Result<(), PortError> {
        let payload = serde_json::to_string(&record.event)
            .map_err(|e| PortError::decode(format!("failed to serialize audit event: {e}")))?;
        info!(
            target: "audit",
            audit_id = %record.id,
            event = record.event.name(),
            tenant_id = ?record.event.tenant_id(),
            occurred_at = %record.occurred_at,
            payload = %payload,
            "audit event"
        );
        Ok(())
    }
}
