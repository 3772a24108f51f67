//! Artifact store client
//!
//! Ships the files of a finished task to the artifact store as one
//! `multipart/form-data` POST. File parts are streamed from disk.

use recyclus_core::dto::upload::UploadPackage;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::UploadError;

/// Media type declared for every uploaded file
const FILE_MEDIA_TYPE: &str = "text/plain";

/// What the artifact store answered to a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub status: u16,
    pub body: String,
}

/// HTTP client for the artifact store
#[derive(Debug, Clone)]
pub struct ArtifactClient {
    /// Upload endpoint (e.g., "http://datastore:5020/api/internal/store")
    endpoint: String,
    client: Client,
}

impl ArtifactClient {
    /// Create a new artifact store client
    ///
    /// # Arguments
    /// * `endpoint` - Full URL of the upload endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Uploads a package
    ///
    /// Any 2xx answer is a success; everything else is an [`UploadError`].
    pub async fn upload(&self, package: &UploadPackage) -> Result<UploadReceipt, UploadError> {
        let form = build_form(package).await?;

        debug!(
            "Uploading {} file(s) for job {} to {}",
            package.files.len(),
            package.metadata.jobid,
            self.endpoint
        );

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(UploadError::rejected(status.as_u16(), body));
        }

        Ok(UploadReceipt {
            status: status.as_u16(),
            body,
        })
    }
}

/// Builds the multipart form: metadata text fields, then one part per file
async fn build_form(package: &UploadPackage) -> Result<Form, UploadError> {
    let meta = &package.metadata;
    let mut form = Form::new()
        .text("user", meta.user.clone())
        .text("name", meta.name.clone())
        .text("jobid", meta.jobid.clone());

    for file in &package.files {
        let handle = tokio::fs::File::open(&file.path)
            .await
            .map_err(|source| UploadError::Io {
                path: file.path.display().to_string(),
                source,
            })?;
        let length = handle
            .metadata()
            .await
            .map_err(|source| UploadError::Io {
                path: file.path.display().to_string(),
                source,
            })?
            .len();

        let body = Body::wrap_stream(ReaderStream::new(handle));
        let part = Part::stream_with_length(body, length)
            .file_name(file.file_name())
            .mime_str(FILE_MEDIA_TYPE)?;

        form = form.part(file.role.as_str(), part);
    }

    Ok(form)
}
