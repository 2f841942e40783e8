mod clean;
mod plan;
mod run;

use std::path::Path;

use anyhow::{Context, Result};

use wheelhouse_lib::config::{ConfigError, PipelineConfig};
use wheelhouse_lib::matrix::MatrixError;
use wheelhouse_lib::pipeline::{PipelineError, Trigger};

pub use clean::cmd_clean;
pub use plan::cmd_plan;
pub use run::{RunOptions, cmd_run};

/// Explicit flags win over the git ref; no information means a branch push.
pub fn resolve_trigger(git_ref: Option<&str>, tag: bool, pull_request: bool) -> Trigger {
  if tag {
    Trigger::TagPush
  } else if pull_request {
    Trigger::PullRequest
  } else {
    git_ref.map(Trigger::from_ref).unwrap_or(Trigger::BranchPush)
  }
}

fn load_config(path: &Path) -> Result<PipelineConfig> {
  PipelineConfig::load(path).with_context(|| format!("Failed to load config: {}", path.display()))
}

/// Errors in user input rather than in the run itself.
pub fn is_config_error(err: &anyhow::Error) -> bool {
  err.chain().any(|cause| {
    cause.is::<ConfigError>()
      || cause.is::<MatrixError>()
      || matches!(
        cause.downcast_ref::<PipelineError>(),
        Some(PipelineError::Config(_) | PipelineError::Matrix(_) | PipelineError::MissingCredentials)
      )
  })
}
