//! Pipeline orchestration.
//!
//! A [`Pipeline`] expands the matrix, hands the units to the
//! [`MatrixExecutor`], aggregates their reports, applies the publish gate and
//! writes the artifacts directory.
//!
//! # Submodules
//!
//! - [`executor`] - bounded-concurrency unit scheduling
//! - [`artifacts`] - the artifacts directory and `pipeline.json`
//! - [`types`] - triggers, reports and run results

pub mod artifacts;
pub mod executor;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

pub use executor::{CancelSignal, Execution, MatrixExecutor, never_cancelled};
pub use types::*;

use crate::build::{Builder, CommandToolchain};
use crate::config::{IndexKind, ManagerKind, PipelineConfig};
use crate::env::{CondaManager, EnvManager, Provisioner, VenvManager};
use crate::matrix::MatrixSpec;
use crate::platform::paths;
use crate::publish::{Credentials, HttpIndex, PackageIndex, Publisher, TwineIndex, should_publish};
use crate::util::hash::{ContentHash, hash_directory};
use crate::verify::Verifier;

/// Entries skipped when fingerprinting the source tree.
const SOURCE_HASH_EXCLUDES: &[&str] = &[".git", "build", "dist", "_skbuild", ".tox", "__pycache__"];

pub struct Pipeline {
  executor: MatrixExecutor,
  publisher: Option<Publisher>,
  artifacts_dir: PathBuf,
  dry_run: bool,
}

impl Pipeline {
  pub fn new(executor: MatrixExecutor, artifacts_dir: impl Into<PathBuf>) -> Self {
    Self {
      executor,
      publisher: None,
      artifacts_dir: artifacts_dir.into(),
      dry_run: false,
    }
  }

  pub fn with_publisher(mut self, publisher: Publisher) -> Self {
    self.publisher = Some(publisher);
    self
  }

  /// Build and verify, but never upload.
  pub fn with_dry_run(mut self, dry_run: bool) -> Self {
    self.dry_run = dry_run;
    self
  }

  pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
    self.executor = self.executor.with_cancel(cancel);
    self
  }

  /// Wire up the real collaborators described by a config.
  pub fn from_config(config: &PipelineConfig) -> Self {
    let work_root = config.work_root();

    let manager: Arc<dyn EnvManager> = match config.environment.manager {
      ManagerKind::Venv => Arc::new(VenvManager::new(
        paths::envs_dir(&work_root),
        config.environment.interpreters.clone(),
      )),
      ManagerKind::Conda => Arc::new(CondaManager::new(&config.environment.conda)),
    };
    let provisioner = Provisioner::new(manager);

    let toolchain = CommandToolchain {
      wheel_command: config.build.wheel_command.clone(),
      sdist_command: config.build.sdist_command.clone(),
      timeout: config.build_timeout(),
    };
    let builder = Builder::new(Arc::new(toolchain), &config.source_dir, paths::builds_dir(&work_root))
      .with_extra_args(config.build.extra_args.clone());

    let verifier = Verifier::new(provisioner.clone(), &config.source_dir)
      .with_command(&config.verify.command)
      .with_packages(config.verify.packages.clone())
      .with_timeout(config.verify_timeout());

    let executor = MatrixExecutor::new(provisioner, Arc::new(builder), Arc::new(verifier))
      .with_build_packages(config.environment.build_packages.clone())
      .with_max_parallel(config.max_parallel);

    let index: Arc<dyn PackageIndex> = match config.publish.index {
      IndexKind::Http => Arc::new(HttpIndex::new(config.publish.repository_url())),
      IndexKind::Twine => Arc::new(TwineIndex::new(
        &config.publish.twine,
        config.publish.repository_url.clone(),
      )),
    };

    Self::new(executor, &config.artifacts_dir).with_publisher(Publisher::new(index))
  }

  pub fn artifacts_dir(&self) -> &Path {
    &self.artifacts_dir
  }

  /// Execute the whole matrix for `trigger`.
  ///
  /// The artifacts directory is written whatever the outcome. A failed
  /// publish is returned as [`PipelineError::Publish`] carrying the run; a
  /// failed write as [`PipelineError::Artifacts`], which carries the run and
  /// any publish error too.
  pub async fn run(
    &self,
    matrix: &MatrixSpec,
    trigger: Trigger,
    credentials: Option<&Credentials>,
  ) -> Result<PipelineRun, PipelineError> {
    let units = matrix.expand()?;

    let publishing = trigger == Trigger::TagPush && self.publisher.is_some() && !self.dry_run;
    if publishing && credentials.is_none() {
      return Err(PipelineError::MissingCredentials);
    }

    let source_hash = self.source_hash();
    info!(%trigger, units = units.len(), "starting pipeline");

    let Execution { results, leaked_envs } = self.executor.execute(&units).await;
    let overall_status = PipelineRun::aggregate(&units, &results, &leaked_envs);
    info!(?overall_status, leaked = leaked_envs.len(), "matrix finished");

    let mut run = PipelineRun {
      id: run_id(trigger),
      trigger,
      units,
      results,
      overall_status,
      source_hash,
      leaked_envs,
      publish: PublishOutcome::Skipped {
        reason: String::new(),
      },
    };

    let mut publish_error = None;
    run.publish = match (&self.publisher, credentials) {
      _ if !should_publish(trigger, overall_status) => PublishOutcome::Skipped {
        reason: skip_reason(trigger),
      },
      _ if self.dry_run => PublishOutcome::Skipped {
        reason: "dry run".to_string(),
      },
      (Some(publisher), Some(credentials)) => {
        match publisher.publish(&run.verified_artifacts(), credentials).await {
          Ok(result) => PublishOutcome::Published(result),
          Err(e) => {
            let outcome = PublishOutcome::Failed {
              error: e.to_string(),
              uploaded: e.uploaded.clone(),
            };
            publish_error = Some(e);
            outcome
          }
        }
      }
      _ => PublishOutcome::Skipped {
        reason: "no package index configured".to_string(),
      },
    };

    if let Err(source) = artifacts::write_artifacts_dir(&self.artifacts_dir, &run).await {
      return Err(PipelineError::Artifacts {
        dir: self.artifacts_dir.clone(),
        run: Box::new(run),
        publish_error,
        source,
      });
    }

    match publish_error {
      Some(source) => Err(PipelineError::Publish {
        run: Box::new(run),
        source,
      }),
      None => Ok(run),
    }
  }

  fn source_hash(&self) -> Option<ContentHash> {
    let source_dir = self.executor.builder().source_dir();
    if !source_dir.is_dir() {
      return None;
    }
    hash_directory(source_dir, SOURCE_HASH_EXCLUDES)
      .inspect_err(|e| warn!(error = %e, "could not fingerprint source tree"))
      .ok()
  }
}

fn skip_reason(trigger: Trigger) -> String {
  match trigger {
    Trigger::TagPush => "required units failed".to_string(),
    trigger => format!("{} does not publish", trigger),
  }
}

fn run_id(trigger: Trigger) -> String {
  let secs = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or_default();
  format!("{}-{}", trigger, secs)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::env::EnvRegistry;
  use crate::matrix::{BuildKind, IncludeEntry, PythonVersion};
  use crate::platform::arch::Arch;
  use crate::publish::UploadError;
  use crate::util::testutil::{FakeEnvManager, FakeIndex, FakeToolchain};
  use std::time::Duration;
  use tempfile::TempDir;

  struct Harness {
    temp: TempDir,
    manager: Arc<FakeEnvManager>,
    toolchain: Arc<FakeToolchain>,
    index: Arc<FakeIndex>,
    pipeline: Pipeline,
  }

  impl Harness {
    fn artifacts_dir(&self) -> PathBuf {
      self.temp.path().join("artifacts")
    }
  }

  fn harness(manager: FakeEnvManager, toolchain: FakeToolchain, index: FakeIndex, verify_command: &str) -> Harness {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("src");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("setup.py"), "from setuptools import setup\nsetup()\n").unwrap();

    let manager = Arc::new(manager);
    let toolchain = Arc::new(toolchain);
    let index = Arc::new(index);

    let provisioner = Provisioner::with_registry(manager.clone(), Arc::new(EnvRegistry::new()));
    let builder = Builder::new(toolchain.clone(), &source, temp.path().join("builds"));
    let verifier = Verifier::new(provisioner.clone(), &source).with_command(verify_command);
    let executor = MatrixExecutor::new(provisioner, Arc::new(builder), Arc::new(verifier)).with_max_parallel(2);
    let pipeline = Pipeline::new(executor, temp.path().join("artifacts")).with_publisher(Publisher::new(index.clone()));

    Harness {
      temp,
      manager,
      toolchain,
      index,
      pipeline,
    }
  }

  fn default_harness() -> Harness {
    harness(
      FakeEnvManager::default(),
      FakeToolchain::default(),
      FakeIndex::default(),
      "echo ok",
    )
  }

  fn include(arch: Arch) -> IncludeEntry {
    IncludeEntry {
      python: PythonVersion::new(3, 8),
      arch,
      kind: BuildKind::Wheel,
      generator: None,
      required: true,
    }
  }

  /// `[{3.8, x64, wheel}, {3.8, x86, wheel}]`
  fn two_wheels() -> MatrixSpec {
    MatrixSpec::enumerated(vec![include(Arch::X64), include(Arch::X86)])
  }

  fn creds() -> Credentials {
    Credentials::new("ci", "secret")
  }

  fn assert_no_leaks(h: &Harness) {
    assert_eq!(h.manager.live(), 0, "environments left alive");
    for name in h.manager.created() {
      assert_eq!(h.manager.destroyed(&name), 1, "{} destroyed once", name);
    }
  }

  #[tokio::test]
  async fn tag_push_all_pass_publishes_both_artifacts() {
    let h = default_harness();

    let run = h
      .pipeline
      .run(&two_wheels(), Trigger::TagPush, Some(&creds()))
      .await
      .unwrap();

    assert_eq!(run.overall_status, OverallStatus::Success);
    assert!(run.succeeded());
    assert_eq!(h.index.attempts(), 2);
    assert_eq!(h.index.uploads().len(), 2);
    assert!(matches!(run.publish, PublishOutcome::Published(ref r) if r.uploaded.len() == 2));
    assert_no_leaks(&h);
  }

  #[tokio::test]
  async fn x86_build_error_fails_run_without_publishing() {
    let h = harness(
      FakeEnvManager::default(),
      FakeToolchain::default().failing(Arch::X86),
      FakeIndex::default(),
      "echo ok",
    );
    let matrix = two_wheels();

    let run = h.pipeline.run(&matrix, Trigger::TagPush, Some(&creds())).await.unwrap();

    let units = matrix.expand().unwrap();
    let x64 = &run.results[&units[0].id()];
    let x86 = &run.results[&units[1].id()];
    assert_eq!(run.overall_status, OverallStatus::Failure);
    assert_eq!(x64.status, UnitStatus::Passed);
    assert_eq!(x86.status, UnitStatus::Failed);
    assert_eq!(x86.stage, Some(Stage::Build));
    assert_eq!(h.index.attempts(), 0);
    assert!(matches!(run.publish, PublishOutcome::Skipped { .. }));
    assert_no_leaks(&h);
  }

  #[tokio::test]
  async fn pull_request_never_publishes() {
    let h = default_harness();

    let run = h
      .pipeline
      .run(&two_wheels(), Trigger::PullRequest, Some(&creds()))
      .await
      .unwrap();

    assert_eq!(run.overall_status, OverallStatus::Success);
    assert_eq!(h.index.attempts(), 0);
    assert_no_leaks(&h);
  }

  #[tokio::test]
  async fn branch_push_never_publishes() {
    let h = default_harness();

    let run = h.pipeline.run(&two_wheels(), Trigger::BranchPush, None).await.unwrap();

    assert_eq!(run.overall_status, OverallStatus::Success);
    assert_eq!(h.index.attempts(), 0);
  }

  #[tokio::test]
  async fn sibling_failure_does_not_change_other_results() {
    let matrix = two_wheels();
    let units = matrix.expand().unwrap();

    let clean = default_harness();
    let clean_run = clean.pipeline.run(&matrix, Trigger::BranchPush, None).await.unwrap();

    let broken = harness(
      FakeEnvManager::default(),
      FakeToolchain::default().failing(Arch::X86),
      FakeIndex::default(),
      "echo ok",
    );
    let broken_run = broken.pipeline.run(&matrix, Trigger::BranchPush, None).await.unwrap();

    let x64 = units[0].id();
    assert_eq!(clean_run.results[&x64].status, broken_run.results[&x64].status);
    assert_eq!(
      clean_run.results[&x64].artifact.as_ref().map(|a| a.sha256.clone()),
      broken_run.results[&x64].artifact.as_ref().map(|a| a.sha256.clone())
    );
  }

  #[tokio::test]
  async fn verification_failure_is_recorded_per_unit() {
    let h = harness(
      FakeEnvManager::default().unresolvable("i686"),
      FakeToolchain::default(),
      FakeIndex::default(),
      "echo ok",
    );
    // The fake wheel for x86 carries the host's 32-bit platform tag.
    let matrix = two_wheels();
    let run = h.pipeline.run(&matrix, Trigger::TagPush, Some(&creds())).await.unwrap();

    if cfg!(target_os = "linux") {
      let x86 = &run.results[&matrix.expand().unwrap()[1].id()];
      assert_eq!(x86.status, UnitStatus::Failed);
      assert_eq!(x86.stage, Some(Stage::Verify));
      assert!(x86.verification.as_ref().is_some_and(|v| !v.passed()));
      assert_eq!(h.index.attempts(), 0);
    }
    assert_no_leaks(&h);
  }

  #[tokio::test]
  async fn provision_failure_is_isolated() {
    let mut py37 = include(Arch::X64);
    py37.python = PythonVersion::new(3, 7);
    let matrix = MatrixSpec::enumerated(vec![py37, include(Arch::X64)]);
    let h = harness(
      FakeEnvManager::default().without_python("3.7"),
      FakeToolchain::default(),
      FakeIndex::default(),
      "echo ok",
    );

    let run = h.pipeline.run(&matrix, Trigger::BranchPush, None).await.unwrap();
    let units = matrix.expand().unwrap();

    assert_eq!(run.results[&units[0].id()].stage, Some(Stage::Provision));
    assert_eq!(run.results[&units[1].id()].status, UnitStatus::Passed);
    assert_no_leaks(&h);
  }

  #[tokio::test]
  async fn optional_unit_failure_still_publishes_passing_artifacts() {
    let mut optional = include(Arch::X86);
    optional.required = false;
    let matrix = MatrixSpec::enumerated(vec![include(Arch::X64), optional]);
    let h = harness(
      FakeEnvManager::default(),
      FakeToolchain::default().failing(Arch::X86),
      FakeIndex::default(),
      "echo ok",
    );

    let run = h.pipeline.run(&matrix, Trigger::TagPush, Some(&creds())).await.unwrap();

    assert_eq!(run.overall_status, OverallStatus::Success);
    assert_eq!(h.index.uploads().len(), 1);
  }

  #[tokio::test]
  async fn panicking_unit_is_reported_failed() {
    let h = harness(
      FakeEnvManager::default(),
      FakeToolchain::default().panicking(Arch::X86),
      FakeIndex::default(),
      "echo ok",
    );
    let matrix = two_wheels();

    let run = h.pipeline.run(&matrix, Trigger::BranchPush, None).await.unwrap();

    assert_eq!(run.results.len(), 2);
    let x86 = &run.results[&matrix.expand().unwrap()[1].id()];
    assert_eq!(x86.status, UnitStatus::Failed);
    assert!(x86.error.as_deref().is_some_and(|e| e.contains("panicked")));
    // The panicked unit's build env is reclaimed by the sweep.
    assert_eq!(h.manager.live(), 0);
  }

  #[tokio::test]
  async fn publish_failure_is_fatal_and_lists_uploaded() {
    let h = harness(
      FakeEnvManager::default(),
      FakeToolchain::default(),
      FakeIndex::default().rejecting("py3.8-x86"),
      "echo ok",
    );

    let err = h
      .pipeline
      .run(&two_wheels(), Trigger::TagPush, Some(&creds()))
      .await
      .unwrap_err();

    let (run, source) = match err {
      PipelineError::Publish { run, source } => (run, source),
      other => panic!("expected publish error, got {:?}", other),
    };
    assert!(matches!(source.source, UploadError::Authentication(_)));
    assert_eq!(source.uploaded.len(), 1);
    assert!(!run.succeeded());
    assert!(matches!(run.publish, PublishOutcome::Failed { .. }));
    assert!(h.artifacts_dir().join("pipeline.json").exists());
  }

  #[tokio::test]
  async fn unreachable_index_fails_publish_at_first_artifact() {
    let h = harness(
      FakeEnvManager::default(),
      FakeToolchain::default(),
      FakeIndex::default().unreachable("py3.8-x64"),
      "echo ok",
    );

    let err = h
      .pipeline
      .run(&two_wheels(), Trigger::TagPush, Some(&creds()))
      .await
      .unwrap_err();

    let (run, source) = match err {
      PipelineError::Publish { run, source } => (run, source),
      other => panic!("expected publish error, got {:?}", other),
    };
    assert!(matches!(source.source, UploadError::Transport(_)));
    assert!(source.uploaded.is_empty());
    assert_eq!(h.index.attempts(), 1);
    assert!(matches!(run.publish, PublishOutcome::Failed { ref uploaded, .. } if uploaded.is_empty()));
  }

  #[tokio::test]
  async fn build_env_teardown_failure_fails_unit_and_blocks_publish() {
    let h = harness(
      FakeEnvManager::default().undestroyable("build-py3.8-x64-wheel"),
      FakeToolchain::default(),
      FakeIndex::default(),
      "echo ok",
    );
    let matrix = MatrixSpec::enumerated(vec![include(Arch::X64)]);

    let run = h.pipeline.run(&matrix, Trigger::TagPush, Some(&creds())).await.unwrap();

    let report = &run.results[&matrix.expand().unwrap()[0].id()];
    assert_eq!(report.status, UnitStatus::Failed);
    assert_eq!(report.stage, Some(Stage::Teardown));
    assert!(report.error.as_deref().is_some_and(|e| e.contains("device busy")));
    assert_eq!(run.overall_status, OverallStatus::Failure);
    assert!(!run.succeeded());
    assert_eq!(run.leaked_envs.len(), 1);
    assert_eq!(run.leaked_envs[0].name, "build-py3.8-x64-wheel");
    assert_eq!(h.index.attempts(), 0);
    assert!(matches!(run.publish, PublishOutcome::Skipped { .. }));
  }

  #[tokio::test]
  async fn verify_env_teardown_failure_fails_unit() {
    let h = harness(
      FakeEnvManager::default().undestroyable("verify-py3.8-x64-wheel"),
      FakeToolchain::default(),
      FakeIndex::default(),
      "echo ok",
    );
    let matrix = MatrixSpec::enumerated(vec![include(Arch::X64)]);

    let run = h.pipeline.run(&matrix, Trigger::BranchPush, None).await.unwrap();

    let report = &run.results[&matrix.expand().unwrap()[0].id()];
    assert_eq!(report.stage, Some(Stage::Teardown));
    assert_eq!(run.overall_status, OverallStatus::Failure);
    assert_eq!(run.leaked_envs.len(), 1);

    let summary: serde_json::Value =
      serde_json::from_slice(&std::fs::read(h.artifacts_dir().join("pipeline.json")).unwrap()).unwrap();
    assert_eq!(summary["leaked_envs"][0]["name"], "verify-py3.8-x64-wheel");
  }

  #[tokio::test]
  async fn cancel_during_build_finishes_build_and_skips_verification() {
    let (tx, rx) = tokio::sync::watch::channel(false);
    let mut h = harness(
      FakeEnvManager::default(),
      FakeToolchain::default().cancelling(tx),
      FakeIndex::default(),
      "echo ok",
    );
    h.pipeline = h.pipeline.with_cancel(rx);
    let matrix = MatrixSpec::enumerated(vec![include(Arch::X64)]);

    let run = h.pipeline.run(&matrix, Trigger::TagPush, Some(&creds())).await.unwrap();

    let report = &run.results[&matrix.expand().unwrap()[0].id()];
    assert_eq!(report.status, UnitStatus::Cancelled);
    assert_eq!(report.stage, Some(Stage::Verify));
    assert!(report.artifact.is_some());
    assert_eq!(h.toolchain.calls().len(), 1);
    assert_eq!(h.manager.destroyed("build-py3.8-x64-wheel"), 1);
    assert!(h.manager.created().iter().all(|name| !name.starts_with("verify-")));
    assert_eq!(h.index.attempts(), 0);
    assert_no_leaks(&h);
  }

  #[tokio::test]
  async fn failed_artifacts_write_keeps_run_and_publish_outcome() {
    let h = default_harness();
    std::fs::write(h.artifacts_dir(), "not a directory").unwrap();

    let err = h
      .pipeline
      .run(&two_wheels(), Trigger::TagPush, Some(&creds()))
      .await
      .unwrap_err();

    let (run, publish_error) = match err {
      PipelineError::Artifacts { run, publish_error, .. } => (run, publish_error),
      other => panic!("expected artifacts error, got {:?}", other),
    };
    assert!(publish_error.is_none());
    assert!(matches!(run.publish, PublishOutcome::Published(ref r) if r.uploaded.len() == 2));
    assert_eq!(h.index.uploads().len(), 2);
  }

  #[tokio::test]
  async fn tag_push_without_credentials_is_rejected_up_front() {
    let h = default_harness();

    let err = h.pipeline.run(&two_wheels(), Trigger::TagPush, None).await.unwrap_err();

    assert!(matches!(err, PipelineError::MissingCredentials));
    assert!(h.manager.created().is_empty());
  }

  #[tokio::test]
  async fn dry_run_skips_publish() {
    let mut h = default_harness();
    h.pipeline = h.pipeline.with_dry_run(true);

    let run = h.pipeline.run(&two_wheels(), Trigger::TagPush, None).await.unwrap();

    assert!(matches!(run.publish, PublishOutcome::Skipped { ref reason } if reason == "dry run"));
    assert_eq!(h.index.attempts(), 0);
  }

  #[tokio::test]
  async fn cancelled_run_reports_cancelled_and_leaks_nothing() {
    let (tx, rx) = tokio::sync::watch::channel(false);
    let mut h = default_harness();
    h.pipeline = h.pipeline.with_cancel(rx);
    tx.send(true).unwrap();

    let run = h.pipeline.run(&two_wheels(), Trigger::TagPush, Some(&creds())).await.unwrap();

    assert!(run.results.values().all(|r| r.status == UnitStatus::Cancelled));
    assert_eq!(run.overall_status, OverallStatus::Failure);
    assert_eq!(h.index.attempts(), 0);
    assert_no_leaks(&h);
  }

  #[tokio::test]
  async fn concurrency_is_bounded_by_max_parallel() {
    let h = harness(
      FakeEnvManager::default().with_delay(Duration::from_millis(20)),
      FakeToolchain::default(),
      FakeIndex::default(),
      "echo ok",
    );
    let matrix = MatrixSpec {
      python: vec![PythonVersion::new(3, 6), PythonVersion::new(3, 7), PythonVersion::new(3, 8)],
      arch: vec![Arch::X64, Arch::X86],
      kind: vec![BuildKind::Wheel],
      ..Default::default()
    };

    let run = h.pipeline.run(&matrix, Trigger::BranchPush, None).await.unwrap();

    assert_eq!(run.results.len(), 6);
    // Two units at a time, one environment each.
    assert!(h.manager.max_live() <= 2, "max live {}", h.manager.max_live());
    assert_eq!(h.toolchain.calls().len(), 6);
    assert_no_leaks(&h);
  }

  #[tokio::test]
  async fn artifacts_directory_is_always_written() {
    let h = harness(
      FakeEnvManager::default(),
      FakeToolchain::default().failing(Arch::X86),
      FakeIndex::default(),
      "echo ok",
    );

    h.pipeline.run(&two_wheels(), Trigger::BranchPush, None).await.unwrap();

    let dir = h.artifacts_dir();
    let summary: serde_json::Value =
      serde_json::from_slice(&std::fs::read(dir.join("pipeline.json")).unwrap()).unwrap();
    assert_eq!(summary["overall_status"], "failure");

    let x86 = dir.join("py3.8-x86-wheel");
    assert!(std::fs::read_to_string(x86.join("build.log")).unwrap().contains("compiler failed"));
    assert!(x86.join("verify.log").exists());

    let x64 = dir.join("py3.8-x64-wheel");
    let copied: Vec<_> = std::fs::read_dir(&x64)
      .unwrap()
      .filter_map(|e| e.ok())
      .filter(|e| e.file_name().to_string_lossy().ends_with(".whl"))
      .collect();
    assert_eq!(copied.len(), 1);
    assert!(std::fs::read_to_string(x64.join("verify.log")).unwrap().contains("ok"));
  }

  #[tokio::test]
  async fn failed_unit_dir_drops_previous_run_output() {
    let h = harness(
      FakeEnvManager::default(),
      FakeToolchain::default().failing(Arch::X86),
      FakeIndex::default(),
      "echo ok",
    );
    let stale = h.artifacts_dir().join("py3.8-x86-wheel");
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(stale.join("demo-1.0-cp38-cp38-i686.whl"), "last run").unwrap();

    h.pipeline.run(&two_wheels(), Trigger::BranchPush, None).await.unwrap();

    let wheels: Vec<_> = std::fs::read_dir(&stale)
      .unwrap()
      .filter_map(|e| e.ok())
      .filter(|e| e.file_name().to_string_lossy().ends_with(".whl"))
      .collect();
    assert!(wheels.is_empty());
    assert!(stale.join("build.log").exists());
  }

  #[tokio::test]
  async fn duplicate_units_are_rejected_before_running() {
    let h = default_harness();
    let matrix = MatrixSpec::enumerated(vec![include(Arch::X64), include(Arch::X64)]);

    let err = h.pipeline.run(&matrix, Trigger::BranchPush, None).await.unwrap_err();

    assert!(matches!(err, PipelineError::Matrix(_)));
    assert!(h.toolchain.calls().is_empty());
  }

  #[tokio::test]
  async fn x86_units_thread_32bit_flag() {
    let h = harness(
      FakeEnvManager::default(),
      FakeToolchain::default(),
      FakeIndex::default(),
      "echo ok",
    );
    let mut x86 = include(Arch::X86);
    x86.generator = Some("Visual Studio 15 2017".to_string());

    h.pipeline
      .run(&MatrixSpec::enumerated(vec![x86]), Trigger::BranchPush, None)
      .await
      .unwrap();

    assert_eq!(
      h.manager.created_32bit(),
      vec!["build-py3.8-x86-wheel".to_string(), "verify-py3.8-x86-wheel".to_string()]
    );
    let calls = h.toolchain.calls();
    assert_eq!(calls[0].generator, "Visual Studio 15 2017");
    assert_eq!(calls[0].extra_args, vec!["-A".to_string(), "Win32".to_string()]);
  }
}
