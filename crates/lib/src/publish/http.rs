//! Upload over the legacy package-index upload API.

use std::path::Path;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use tracing::debug;

use super::{Credentials, PackageIndex, UploadError};
use crate::dist::DistFilename;
use crate::util::hash::hash_bytes;

pub const DEFAULT_REPOSITORY_URL: &str = "https://upload.pypi.org/legacy/";

pub struct HttpIndex {
  client: reqwest::Client,
  repository_url: String,
}

impl HttpIndex {
  pub fn new(repository_url: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      repository_url: repository_url.into(),
    }
  }
}

impl Default for HttpIndex {
  fn default() -> Self {
    Self::new(DEFAULT_REPOSITORY_URL)
  }
}

/// Form fields sent alongside the file, in upload order.
fn upload_fields(dist: &DistFilename, sha256: &str) -> Vec<(&'static str, String)> {
  vec![
    (":action", "file_upload".to_string()),
    ("protocol_version", "1".to_string()),
    ("name", dist.name.clone()),
    ("version", dist.version.clone()),
    ("filetype", dist.filetype().to_string()),
    ("pyversion", dist.pyversion().to_string()),
    ("sha256_digest", sha256.to_string()),
  ]
}

fn classify_status(status: StatusCode, body: &str) -> Result<(), UploadError> {
  if status.is_success() {
    return Ok(());
  }
  let message = format!("{} {}", status, body.trim());
  match status {
    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(UploadError::Authentication(message)),
    _ => Err(UploadError::Transport(message)),
  }
}

#[async_trait]
impl PackageIndex for HttpIndex {
  fn location(&self) -> String {
    self.repository_url.clone()
  }

  async fn upload(&self, artifact_path: &Path, credentials: &Credentials) -> Result<(), UploadError> {
    let file_name = artifact_path
      .file_name()
      .and_then(|n| n.to_str())
      .ok_or_else(|| UploadError::InvalidArtifact {
        path: artifact_path.to_path_buf(),
        message: "path has no file name".to_string(),
      })?;
    let dist: DistFilename = file_name.parse()?;

    let bytes = tokio::fs::read(artifact_path)
      .await
      .map_err(|e| UploadError::InvalidArtifact {
        path: artifact_path.to_path_buf(),
        message: e.to_string(),
      })?;
    let sha256 = hash_bytes(&bytes);

    let mut form = Form::new();
    for (key, value) in upload_fields(&dist, &sha256.0) {
      form = form.text(key, value);
    }
    let part = Part::bytes(bytes)
      .file_name(file_name.to_string())
      .mime_str("application/octet-stream")
      .map_err(|e| UploadError::Transport(e.to_string()))?;
    form = form.part("content", part);

    debug!(url = %self.repository_url, file = %file_name, "posting upload");
    let response = self
      .client
      .post(&self.repository_url)
      .basic_auth(&credentials.username, Some(&credentials.password))
      .multipart(form)
      .send()
      .await
      .map_err(|e| UploadError::Transport(e.to_string()))?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    classify_status(status, &body)
  }
}
