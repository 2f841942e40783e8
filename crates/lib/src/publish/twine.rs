//! Upload through the `twine` command-line client.

use std::path::Path;

use async_trait::async_trait;

use super::{Credentials, PackageIndex, UploadError};
use crate::cmd::{self, CmdSpec, quote};

pub struct TwineIndex {
  twine: String,
  repository_url: Option<String>,
}

impl TwineIndex {
  pub fn new(twine: impl Into<String>, repository_url: Option<String>) -> Self {
    Self {
      twine: twine.into(),
      repository_url,
    }
  }

  fn script(&self, artifact_path: &Path) -> String {
    let mut script = format!("{} upload --non-interactive", quote(&self.twine));
    if let Some(url) = &self.repository_url {
      script.push_str(&format!(" --repository-url {}", quote(url)));
    }
    script.push(' ');
    script.push_str(&quote(&artifact_path.to_string_lossy()));
    script
  }
}

/// Map twine's output to an upload error.
fn classify_failure(log: &str) -> UploadError {
  let auth_markers = ["403", "401", "Invalid or non-existent authentication", "Forbidden"];
  if auth_markers.iter().any(|m| log.contains(m)) {
    UploadError::Authentication(log.trim().to_string())
  } else {
    UploadError::Transport(log.trim().to_string())
  }
}

#[async_trait]
impl PackageIndex for TwineIndex {
  fn location(&self) -> String {
    self.repository_url.clone().unwrap_or_else(|| "twine default repository".to_string())
  }

  async fn upload(&self, artifact_path: &Path, credentials: &Credentials) -> Result<(), UploadError> {
    if !artifact_path.is_file() {
      return Err(UploadError::InvalidArtifact {
        path: artifact_path.to_path_buf(),
        message: "not a file".to_string(),
      });
    }

    let spec = CmdSpec::new(self.script(artifact_path))
      .with_env("TWINE_USERNAME", &credentials.username)
      .with_env("TWINE_PASSWORD", &credentials.password);

    let output = cmd::run(&spec)
      .await
      .map_err(|e| UploadError::Transport(e.to_string()))?;
    if output.success() {
      Ok(())
    } else {
      Err(classify_failure(&output.combined()))
    }
  }
}
