//! Pipeline run types.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::build::Artifact;
use crate::config::ConfigError;
use crate::matrix::{BuildUnit, MatrixError, UnitId};
use crate::publish::{PublishError, PublishResult};
use crate::util::hash::ContentHash;
use crate::verify::VerificationResult;

/// What started the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
  BranchPush,
  TagPush,
  PullRequest,
}

impl Trigger {
  /// Classify a git ref: `refs/tags/*` is a tag push, `refs/pull/*` (or
  /// `refs/merge-requests/*`) a pull request, anything else a branch push.
  pub fn from_ref(git_ref: &str) -> Self {
    if git_ref.starts_with("refs/tags/") {
      Self::TagPush
    } else if git_ref.starts_with("refs/pull/") || git_ref.starts_with("refs/merge-requests/") {
      Self::PullRequest
    } else {
      Self::BranchPush
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::BranchPush => "branch_push",
      Self::TagPush => "tag_push",
      Self::PullRequest => "pull_request",
    }
  }
}

impl fmt::Display for Trigger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
  Success,
  Failure,
}

/// The step a unit was in when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
  Provision,
  Build,
  Verify,
  /// Destroying one of the unit's environments failed.
  Teardown,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::Provision => "provision",
      Self::Build => "build",
      Self::Verify => "verify",
      Self::Teardown => "teardown",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
  Passed,
  Failed,
  Cancelled,
}

/// Everything recorded about one unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
  pub unit: BuildUnit,
  pub status: UnitStatus,
  /// Where a failed or cancelled unit stopped.
  pub stage: Option<Stage>,
  pub error: Option<String>,
  pub artifact: Option<Artifact>,
  pub verification: Option<VerificationResult>,
  /// Toolchain log, when the toolchain ran.
  pub build_log: Option<PathBuf>,
  pub duration_ms: u64,
}

impl UnitReport {
  pub fn new(unit: BuildUnit) -> Self {
    Self {
      unit,
      status: UnitStatus::Failed,
      stage: None,
      error: None,
      artifact: None,
      verification: None,
      build_log: None,
      duration_ms: 0,
    }
  }

  pub fn passed(&self) -> bool {
    self.status == UnitStatus::Passed
  }

  pub fn failed(mut self, stage: Stage, error: impl fmt::Display) -> Self {
    self.status = UnitStatus::Failed;
    self.stage = Some(stage);
    self.error = Some(error.to_string());
    self
  }

  pub fn cancelled(mut self, stage: Stage) -> Self {
    self.status = UnitStatus::Cancelled;
    self.stage = Some(stage);
    self
  }
}

/// How the publish step ended.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
  Skipped { reason: String },
  Published(PublishResult),
  Failed { error: String, uploaded: Vec<PathBuf> },
}

/// An environment the end-of-run sweep could not destroy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeakedEnv {
  pub name: String,
  pub error: String,
}

/// One pipeline execution.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
  pub id: String,
  pub trigger: Trigger,
  pub units: Vec<BuildUnit>,
  #[serde(serialize_with = "serialize_results")]
  pub results: BTreeMap<UnitId, UnitReport>,
  pub overall_status: OverallStatus,
  pub source_hash: Option<ContentHash>,
  /// Environments still alive after the run.
  pub leaked_envs: Vec<LeakedEnv>,
  pub publish: PublishOutcome,
}

impl PipelineRun {
  /// `Success` iff every required unit passed and no environment leaked.
  pub fn aggregate(
    units: &[BuildUnit],
    results: &BTreeMap<UnitId, UnitReport>,
    leaked_envs: &[LeakedEnv],
  ) -> OverallStatus {
    let all_passed = units
      .iter()
      .filter(|u| u.required)
      .all(|u| results.get(&u.id()).is_some_and(UnitReport::passed));
    if all_passed && leaked_envs.is_empty() {
      OverallStatus::Success
    } else {
      OverallStatus::Failure
    }
  }

  /// Reports in matrix declaration order.
  pub fn reports(&self) -> impl Iterator<Item = &UnitReport> {
    self.units.iter().filter_map(|u| self.results.get(&u.id()))
  }

  /// Artifacts of units that passed verification, in matrix order.
  pub fn verified_artifacts(&self) -> Vec<Artifact> {
    self
      .reports()
      .filter(|r| r.passed() && r.verification.as_ref().is_some_and(|v| v.passed()))
      .filter_map(|r| r.artifact.clone())
      .collect()
  }

  /// Whether the whole run, publish included, succeeded.
  pub fn succeeded(&self) -> bool {
    self.overall_status == OverallStatus::Success && !matches!(self.publish, PublishOutcome::Failed { .. })
  }
}

fn serialize_results<S: Serializer>(results: &BTreeMap<UnitId, UnitReport>, serializer: S) -> Result<S::Ok, S::Error> {
  let mut map = serializer.serialize_map(Some(results.len()))?;
  for (id, report) in results {
    map.serialize_entry(&id.slug(), report)?;
  }
  map.end()
}

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Matrix(#[from] MatrixError),

  /// A tag push would publish but no credentials were supplied.
  #[error("tag push requires index credentials")]
  MissingCredentials,

  /// The run finished, publish step included, but its record could not be
  /// written.
  #[error("failed to write artifacts to {}: {source}", .dir.display())]
  Artifacts {
    dir: PathBuf,
    run: Box<PipelineRun>,
    publish_error: Option<PublishError>,
    #[source]
    source: std::io::Error,
  },

  /// Units ran and were recorded, but publishing failed.
  #[error("{source}")]
  Publish {
    run: Box<PipelineRun>,
    #[source]
    source: PublishError,
  },
}
