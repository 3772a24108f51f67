//! Artifact upload DTOs

use crate::domain::job::JobRecord;
use crate::domain::role::{Role, RoleFile};

/// Job metadata sent with every upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobMetadata {
    pub user: String,
    pub name: String,
    pub jobid: String,
}

impl From<&JobRecord> for JobMetadata {
    fn from(job: &JobRecord) -> Self {
        Self {
            user: job.user.clone(),
            name: job.name.clone(),
            jobid: job.jobid.clone(),
        }
    }
}

/// One multipart upload to the artifact store
///
/// Built fresh for each upload and dropped after the round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPackage {
    pub metadata: JobMetadata,
    pub files: Vec<RoleFile>,
}

impl UploadPackage {
    pub fn new(metadata: JobMetadata, files: Vec<RoleFile>) -> Self {
        Self { metadata, files }
    }

    /// Roles included in this package, in upload order
    pub fn roles(&self) -> Vec<Role> {
        self.files.iter().map(|f| f.role).collect()
    }
}
