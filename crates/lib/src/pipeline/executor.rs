//! Matrix execution.
//!
//! Every unit runs as its own tokio task:
//!
//! ```text
//! provision build env -> build -> release build env -> verify (own env)
//! ```
//!
//! Units share nothing but the environment registry and a semaphore bounding
//! how many run at once. A unit that fails, panics or is cancelled never
//! affects its siblings, and every unit yields exactly one report.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::types::{LeakedEnv, Stage, UnitReport, UnitStatus};
use crate::build::Builder;
use crate::env::{EnvRequest, ProvisionError, Provisioner};
use crate::matrix::{BuildUnit, UnitId};
use crate::verify::Verifier;

/// Receiving side of a cancellation signal; `true` means stop.
pub type CancelSignal = watch::Receiver<bool>;

/// A signal that never fires.
pub fn never_cancelled() -> CancelSignal {
  watch::channel(false).1
}

fn is_cancelled(cancel: &CancelSignal) -> bool {
  *cancel.borrow()
}

/// Reports for every unit plus whatever the final sweep could not destroy.
#[derive(Debug)]
pub struct Execution {
  pub results: BTreeMap<UnitId, UnitReport>,
  pub leaked_envs: Vec<LeakedEnv>,
}

/// Runs units through provision, build and verification.
pub struct MatrixExecutor {
  provisioner: Provisioner,
  builder: Arc<Builder>,
  verifier: Arc<Verifier>,
  build_packages: Vec<String>,
  max_parallel: usize,
  cancel: CancelSignal,
}

impl MatrixExecutor {
  pub fn new(provisioner: Provisioner, builder: Arc<Builder>, verifier: Arc<Verifier>) -> Self {
    Self {
      provisioner,
      builder,
      verifier,
      build_packages: Vec::new(),
      max_parallel: 1,
      cancel: never_cancelled(),
    }
  }

  /// Packages installed into every build environment.
  pub fn with_build_packages(mut self, packages: Vec<String>) -> Self {
    self.build_packages = packages;
    self
  }

  /// At most `max_parallel` units run at once (minimum 1).
  pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
    self.max_parallel = max_parallel.max(1);
    self
  }

  pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn builder(&self) -> &Builder {
    &self.builder
  }

  /// Run every unit and collect one report per unit.
  ///
  /// Before returning, every environment still registered is destroyed;
  /// the ones that survive are listed in [`Execution::leaked_envs`].
  pub async fn execute(&self, units: &[BuildUnit]) -> Execution {
    let semaphore = Arc::new(Semaphore::new(self.max_parallel));
    let mut join_set = JoinSet::new();

    info!(units = units.len(), max_parallel = self.max_parallel, "executing matrix");

    for unit in units {
      let unit = unit.clone();
      let ctx = UnitContext {
        provisioner: self.provisioner.clone(),
        builder: self.builder.clone(),
        verifier: self.verifier.clone(),
        build_packages: self.build_packages.clone(),
        cancel: self.cancel.clone(),
      };
      let semaphore = semaphore.clone();

      join_set.spawn(async move {
        let Ok(_permit) = semaphore.acquire().await else {
          let report = UnitReport::new(unit.clone()).failed(Stage::Provision, "scheduler closed");
          return (unit.id(), report);
        };
        let report = ctx.run(unit.clone()).await;
        (unit.id(), report)
      });
    }

    let mut results = collect_join_results(join_set).await;

    // A panicked task leaves no report behind.
    for unit in units {
      results
        .entry(unit.id())
        .or_insert_with(|| UnitReport::new(unit.clone()).failed(Stage::Build, "unit task panicked"));
    }

    let leaked_envs = self
      .provisioner
      .destroy_all()
      .await
      .into_iter()
      .map(|(name, e)| {
        error!(env = %name, error = %e, "environment could not be destroyed");
        LeakedEnv {
          name,
          error: e.to_string(),
        }
      })
      .collect();

    Execution { results, leaked_envs }
  }
}

async fn collect_join_results(mut join_set: JoinSet<(UnitId, UnitReport)>) -> BTreeMap<UnitId, UnitReport> {
  let mut results = BTreeMap::new();

  while let Some(join_result) = join_set.join_next().await {
    match join_result {
      Ok((id, report)) => {
        results.insert(id, report);
      }
      Err(e) => {
        error!(error = %e, "unit task panicked");
      }
    }
  }

  results
}

/// What one unit task needs.
struct UnitContext {
  provisioner: Provisioner,
  builder: Arc<Builder>,
  verifier: Arc<Verifier>,
  build_packages: Vec<String>,
  cancel: CancelSignal,
}

impl UnitContext {
  async fn run(self, unit: BuildUnit) -> UnitReport {
    let started = Instant::now();
    let id = unit.id();
    let mut report = self.stages(unit).await;
    report.duration_ms = started.elapsed().as_millis() as u64;

    match report.status {
      UnitStatus::Passed => info!(unit = %id, "unit passed"),
      UnitStatus::Failed => warn!(
        unit = %id,
        stage = ?report.stage,
        error = report.error.as_deref().unwrap_or("verification failed"),
        "unit failed"
      ),
      UnitStatus::Cancelled => info!(unit = %id, "unit cancelled"),
    }
    report
  }

  async fn stages(&self, unit: BuildUnit) -> UnitReport {
    let id = unit.id();
    let mut report = UnitReport::new(unit.clone());

    if is_cancelled(&self.cancel) {
      return report.cancelled(Stage::Provision);
    }

    let request = EnvRequest {
      name: format!("build-{}", id.slug()),
      interpreter_version: unit.interpreter_version,
      flags: unit.flags(),
      packages: self.build_packages.clone(),
    };
    let lease = match self.provisioner.create(&request).await {
      Ok(lease) => lease,
      Err(e) => return report.failed(Stage::Provision, e),
    };

    if is_cancelled(&self.cancel) {
      return match lease.release().await {
        Ok(()) => report.cancelled(Stage::Build),
        Err(e) => report.failed(Stage::Teardown, e),
      };
    }

    let built = self
      .builder
      .build(&lease, unit.build_kind, &unit.toolchain_generator)
      .await;
    // The build environment is gone before the verification one exists.
    let released = lease.release().await;

    let log_path = self.builder.log_path(&id);
    if log_path.exists() {
      report.build_log = Some(log_path);
    }

    let artifact = match built {
      Ok(artifact) => artifact,
      Err(e) => return report.failed(Stage::Build, e),
    };
    report.artifact = Some(artifact.clone());
    if let Err(e) = released {
      return report.failed(Stage::Teardown, e);
    }

    if is_cancelled(&self.cancel) {
      return report.cancelled(Stage::Verify);
    }

    debug!(unit = %id, artifact = %artifact.file_name(), "verifying");
    match self.verifier.verify(&artifact).await {
      Ok(result) => {
        report.status = if result.passed() {
          UnitStatus::Passed
        } else {
          report.stage = Some(Stage::Verify);
          UnitStatus::Failed
        };
        report.verification = Some(result);
        report
      }
      Err(e @ ProvisionError::Teardown { .. }) => report.failed(Stage::Teardown, e),
      Err(e) => report.failed(Stage::Verify, e),
    }
  }
}
