//! Artifact upload service
//!
//! Picks the files a task declared for upload and hands them to the
//! artifact store. An upload failure is reported, never retried, and never
//! changes the status already recorded for the task.

use async_trait::async_trait;
use recyclus_client::{ArtifactClient, UploadError, UploadReceipt};
use recyclus_core::domain::role::{Role, RoleFile};
use recyclus_core::dto::upload::{JobMetadata, UploadPackage};
use tracing::{debug, warn};

/// Destination of task artifacts
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    async fn upload(&self, package: UploadPackage) -> Result<UploadReceipt, UploadError>;
}

#[async_trait]
impl ArtifactUploader for ArtifactClient {
    async fn upload(&self, package: UploadPackage) -> Result<UploadReceipt, UploadError> {
        ArtifactClient::upload(self, &package).await
    }
}

/// Builds the package for a task
///
/// Keeps the files whose role is declared and which exist on disk right now;
/// a declared file the task never produced is left out silently.
pub fn collect(metadata: JobMetadata, role_files: &[RoleFile], declared: &[Role]) -> UploadPackage {
    let files = role_files
        .iter()
        .filter(|file| declared.contains(&file.role))
        .filter(|file| {
            let exists = file.path.is_file();
            if !exists {
                debug!("Skipping {} ({}): not produced", file.role, file.path.display());
            }
            exists
        })
        .cloned()
        .collect();

    UploadPackage::new(metadata, files)
}

/// Uploads a package and logs the answer
///
/// Returns whether the artifact store accepted it.
pub async fn ship(uploader: &dyn ArtifactUploader, package: UploadPackage) -> bool {
    let jobid = package.metadata.jobid.clone();
    let roles = package.roles();

    match uploader.upload(package).await {
        Ok(receipt) => {
            debug!(
                "Job {}: sent {:?}, status {} text: {}",
                jobid, roles, receipt.status, receipt.body
            );
            true
        }
        Err(e) => {
            warn!("Job {}: upload of {:?} failed: {}", jobid, roles, e);
            false
        }
    }
}
