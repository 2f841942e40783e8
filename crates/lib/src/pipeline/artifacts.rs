//! The artifacts directory handed back to CI.
//!
//! Written after every run whatever its outcome. Each unit directory is
//! recreated, so nothing from an earlier run survives in it:
//!
//! ```text
//! <artifacts_dir>/
//!   pipeline.json
//!   <unit slug>/
//!     build.log
//!     verify.log
//!     <distribution file>
//! ```

use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, info};

use super::types::PipelineRun;
use crate::consts::SUMMARY_FILENAME;

pub async fn write_artifacts_dir(dir: &Path, run: &PipelineRun) -> std::io::Result<()> {
  tokio::fs::create_dir_all(dir).await?;

  for report in run.reports() {
    let unit_dir = dir.join(report.unit.id().slug());
    match tokio::fs::remove_dir_all(&unit_dir).await {
      Ok(()) => debug!(dir = %unit_dir.display(), "cleared previous unit output"),
      Err(e) if e.kind() == ErrorKind::NotFound => {}
      Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(&unit_dir).await?;

    let mut build_log = match &report.build_log {
      Some(path) => tokio::fs::read_to_string(path).await.unwrap_or_default(),
      None => String::new(),
    };
    if let Some(error) = &report.error {
      if !build_log.is_empty() && !build_log.ends_with('\n') {
        build_log.push('\n');
      }
      build_log.push_str(&format!("wheelhouse: {}\n", error));
    }
    tokio::fs::write(unit_dir.join("build.log"), build_log).await?;

    let verify_log = report.verification.as_ref().map(|v| v.log.as_str()).unwrap_or("");
    tokio::fs::write(unit_dir.join("verify.log"), verify_log).await?;

    if let Some(artifact) = &report.artifact {
      let target = unit_dir.join(artifact.file_name());
      debug!(from = %artifact.path.display(), to = %target.display(), "copying artifact");
      tokio::fs::copy(&artifact.path, &target).await?;
    }
  }

  let summary = serde_json::to_vec_pretty(run).map_err(std::io::Error::other)?;
  tokio::fs::write(dir.join(SUMMARY_FILENAME), summary).await?;

  info!(dir = %dir.display(), "artifacts written");
  Ok(())
}
