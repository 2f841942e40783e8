//! Publishing verified artifacts to a package index.
//!
//! Publishing is gated twice: the caller checks [`should_publish`] for the
//! run as a whole, and only artifacts whose verification passed are handed
//! to the [`Publisher`]. Each artifact gets exactly one upload attempt; the
//! first failure stops the publish.

pub mod credentials;
pub mod http;
pub mod twine;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

pub use credentials::Credentials;
pub use http::HttpIndex;
pub use twine::TwineIndex;

use crate::build::Artifact;
use crate::dist::DistFilenameError;
use crate::pipeline::{OverallStatus, Trigger};

/// Why a single upload failed.
#[derive(Debug, Error)]
pub enum UploadError {
  /// The index rejected the credentials.
  #[error("authentication failed: {0}")]
  Authentication(String),

  /// The index could not be reached or answered with an error.
  #[error("transport error: {0}")]
  Transport(String),

  /// The artifact could not be read.
  #[error("invalid artifact {}: {message}", .path.display())]
  InvalidArtifact { path: PathBuf, message: String },

  #[error("invalid distribution filename: {0}")]
  Filename(#[from] DistFilenameError),
}

/// A publish that stopped at its first failed upload.
#[derive(Debug, Error)]
#[error("failed to publish {}: {source}", .artifact.display())]
pub struct PublishError {
  pub artifact: PathBuf,
  /// Artifacts uploaded before the failure.
  pub uploaded: Vec<PathBuf>,
  #[source]
  pub source: UploadError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishResult {
  pub index: String,
  pub uploaded: Vec<PathBuf>,
}

/// The package-index collaborator.
#[async_trait]
pub trait PackageIndex: Send + Sync {
  /// Where uploads go, for logs and summaries.
  fn location(&self) -> String;

  async fn upload(&self, artifact_path: &Path, credentials: &Credentials) -> Result<(), UploadError>;
}

/// Whether a run may publish at all: only a successful tag push does.
pub fn should_publish(trigger: Trigger, overall_status: OverallStatus) -> bool {
  trigger == Trigger::TagPush && overall_status == OverallStatus::Success
}

pub struct Publisher {
  index: Arc<dyn PackageIndex>,
}

impl Publisher {
  pub fn new(index: Arc<dyn PackageIndex>) -> Self {
    Self { index }
  }

  pub fn location(&self) -> String {
    self.index.location()
  }

  /// Upload `artifacts` in order, one attempt each.
  pub async fn publish(&self, artifacts: &[Artifact], credentials: &Credentials) -> Result<PublishResult, PublishError> {
    let index = self.index.location();
    let mut uploaded = Vec::with_capacity(artifacts.len());

    for artifact in artifacts {
      info!(artifact = %artifact.file_name(), %index, "uploading");
      if let Err(source) = self.index.upload(&artifact.path, credentials).await {
        error!(artifact = %artifact.file_name(), error = %source, "upload failed");
        return Err(PublishError {
          artifact: artifact.path.clone(),
          uploaded,
          source,
        });
      }
      uploaded.push(artifact.path.clone());
    }

    info!(count = uploaded.len(), %index, "publish complete");
    Ok(PublishResult { index, uploaded })
  }
}
