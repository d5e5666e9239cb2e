//! Reconciliation Domain Ports
//!
//! Rendered reports are handed to a [`ReportArtifactStore`], which keeps the
//! bytes and answers with a download reference. The filesystem adapter is
//! used in deployments; the in-memory adapter in tests and single-process
//! setups.

use async_trait::async_trait;

use core_kernel::{DomainPort, PortError, ReportId, TenantId};

use crate::report::ReportFormat;

/// A rendered report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifact {
    pub tenant_id: TenantId,
    pub report_id: ReportId,
    pub format: ReportFormat,
    pub content: Vec<u8>,
}

impl ReportArtifact {
    /// File name of the artifact, e.g. `RPT-<uuid>.csv`
    pub fn file_name(&self) -> String {
        artifact_file_name(self.report_id, self.format)
    }
}

pub(crate) fn artifact_file_name(report_id: ReportId, format: ReportFormat) -> String {
    format!("{}.{}", report_id, format.extension())
}

/// Port for storing rendered reports
#[async_trait]
pub trait ReportArtifactStore: DomainPort {
    /// Stores the artifact and returns its download reference
    async fn put(&self, artifact: ReportArtifact) -> Result<String, PortError>;

    async fn get(&self, tenant_id: TenantId, report_id: ReportId, format: ReportFormat) -> Result<ReportArtifact, PortError>;
}
