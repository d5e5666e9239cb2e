//! Filesystem report artifact store
//!
//! Artifacts are written to `<root>/<tenant id>/<report id>.<ext>` and
//! published under `<public base url>/reports/<tenant id>/<file name>`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use core_kernel::{DomainPort, PortError, ReportId, TenantId};

use crate::ports::{artifact_file_name, ReportArtifact, ReportArtifactStore};
use crate::report::ReportFormat;

#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    root: PathBuf,
    public_base_url: String,
}

impl FileArtifactStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, tenant_id: TenantId, file_name: &str) -> PathBuf {
        self.root.join(tenant_id.to_string()).join(file_name)
    }
}

impl DomainPort for FileArtifactStore {}

#[async_trait]
impl ReportArtifactStore for FileArtifactStore {
    async fn put(&self, artifact: ReportArtifact) -> Result<String, PortError> {
        let file_name = artifact.file_name();
        let path = self.path_for(artifact.tenant_id, &file_name);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| PortError::internal(format!("failed to create {}: {e}", dir.display())))?;
        }
        tokio::fs::write(&path, &artifact.content)
            .await
            .map_err(|e| PortError::internal(format!("failed to write {}: {e}", path.display())))?;

        debug!(path = %path.display(), bytes = artifact.content.len(), "stored report artifact");
        Ok(format!(
            "{}/reports/{}/{}",
            self.public_base_url, artifact.tenant_id, file_name
        ))
    }

    async fn get(&self, tenant_id: TenantId, report_id: ReportId, format: ReportFormat) -> Result<ReportArtifact, PortError> {
        let file_name = artifact_file_name(report_id, format);
        let path = self.path_for(tenant_id, &file_name);
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(ReportArtifact {
                tenant_id,
                report_id,
                format,
                content,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PortError::not_found("ReportArtifact", file_name)),
            Err(e) => Err(PortError::internal(format!("failed to read {}: {e}", path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read_back() {
        let root = std::env::temp_dir().join(format!("payment-reports-{}", ReportId::new()));
        let store = FileArtifactStore::new(&root, "https://files.test/");
        let tenant = TenantId::new();
        let report = ReportId::new();

        let url = store
            .put(ReportArtifact {
                tenant_id: tenant,
                report_id: report,
                format: ReportFormat::Csv,
                content: b"metric,value\n".to_vec(),
            })
            .await
            .unwrap();
        assert_eq!(url, format!("https://files.test/reports/{tenant}/{report}.csv"));

        let artifact = store.get(tenant, report, ReportFormat::Csv).await.unwrap();
        assert_eq!(artifact.content, b"metric,value\n");

        let missing = store.get(tenant, report, ReportFormat::Json).await.unwrap_err();
        assert!(missing.is_not_found());

        let _ = tokio::fs::remove_dir_all(root).await;
    }
}
