//! In-memory report artifact store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use core_kernel::{DomainPort, PortError, ReportId, TenantId};

use crate::ports::{artifact_file_name, ReportArtifact, ReportArtifactStore};
use crate::report::ReportFormat;

/// Keeps artifacts in a map keyed by tenant, report and format
#[derive(Debug)]
pub struct InMemoryArtifactStore {
    base_url: String,
    artifacts: RwLock<HashMap<(TenantId, ReportId, ReportFormat), Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            artifacts: RwLock::default(),
        }
    }

    pub async fn len(&self) -> usize {
        self.artifacts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.artifacts.read().await.is_empty()
    }
}

impl DomainPort for InMemoryArtifactStore {}

#[async_trait]
impl ReportArtifactStore for InMemoryArtifactStore {
    async fn put(&self, artifact: ReportArtifact) -> Result<String, PortError> {
        let url = format!(
            "{}/reports/{}/{}",
            self.base_url,
            artifact.tenant_id,
            artifact.file_name()
        );
        self.artifacts
            .write()
            .await
            .insert((artifact.tenant_id, artifact.report_id, artifact.format), artifact.content);
        Ok(url)
    }

    async fn get(&self, tenant_id: TenantId, report_id: ReportId, format: ReportFormat) -> Result<ReportArtifact, PortError> {
        self.artifacts
            .read()
            .await
            .get(&(tenant_id, report_id, format))
            .cloned()
            .map(|content| ReportArtifact {
                tenant_id,
                report_id,
                format,
                content,
            })
            .ok_or_else(|| PortError::not_found("ReportArtifact", artifact_file_name(report_id, format)))
    }
}
