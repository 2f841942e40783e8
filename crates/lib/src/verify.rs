//! Post-build verification.
//!
//! Each artifact is installed into a fresh environment, never the one it was
//! built in, and exercised by the configured verification program.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::build::Artifact;
use crate::cmd::{self, CmdSpec, quote};
use crate::dist::DistFilename;
use crate::env::{EnvLease, EnvRequest, ProvisionError, Provisioner};
use crate::matrix::{BuildFlags, UnitId};
use crate::placeholder;

/// Default program: import the freshly installed package.
pub const DEFAULT_VERIFY_COMMAND: &str = "{python} -c \"import {module}\"";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
  Pass,
  Fail,
}

/// Terminal outcome of verifying one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
  pub unit: UnitId,
  pub status: VerificationStatus,
  pub log: String,
}

impl VerificationResult {
  pub fn passed(&self) -> bool {
    self.status == VerificationStatus::Pass
  }

  fn fail(unit: UnitId, log: impl Into<String>) -> Self {
    Self {
      unit,
      status: VerificationStatus::Fail,
      log: log.into(),
    }
  }
}

/// Installs artifacts into clean environments and runs the verification
/// program against them.
///
/// The command template may use `{python}`, `{artifact}`, `{module}` and
/// `{source}`.
pub struct Verifier {
  provisioner: Provisioner,
  command: String,
  packages: Vec<String>,
  source_dir: PathBuf,
  timeout: Option<Duration>,
}

impl Verifier {
  pub fn new(provisioner: Provisioner, source_dir: impl Into<PathBuf>) -> Self {
    Self {
      provisioner,
      command: DEFAULT_VERIFY_COMMAND.to_string(),
      packages: Vec::new(),
      source_dir: source_dir.into(),
      timeout: None,
    }
  }

  pub fn with_command(mut self, command: impl Into<String>) -> Self {
    self.command = command.into();
    self
  }

  /// Test dependencies installed next to the artifact.
  pub fn with_packages(mut self, packages: Vec<String>) -> Self {
    self.packages = packages;
    self
  }

  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn env_name(unit: &UnitId) -> String {
    format!("verify-{}", unit.slug())
  }

  /// Verify one artifact.
  ///
  /// Install and runtime failures are reported as a failed result; only a
  /// failure to provision the verification environment is an error. The
  /// environment is destroyed before this returns.
  pub async fn verify(&self, artifact: &Artifact) -> Result<VerificationResult, ProvisionError> {
    let unit = artifact.unit;
    let request = EnvRequest {
      name: Self::env_name(&unit),
      interpreter_version: unit.interpreter_version,
      flags: BuildFlags {
        force_32bit: unit.architecture.is_32bit(),
      },
      packages: Vec::new(),
    };

    let result = self
      .provisioner
      .scoped(&request, async |lease| self.run_in(lease, artifact).await)
      .await?;

    match result.status {
      VerificationStatus::Pass => info!(unit = %unit, "verification passed"),
      VerificationStatus::Fail => warn!(unit = %unit, "verification failed"),
    }
    Ok(result)
  }

  async fn run_in(&self, lease: &mut EnvLease, artifact: &Artifact) -> VerificationResult {
    let unit = artifact.unit;
    let mut log = String::new();

    let mut specs = vec![artifact.path.to_string_lossy().into_owned()];
    specs.extend(self.packages.iter().cloned());
    if let Err(e) = lease.install(&specs).await {
      log.push_str(&format!("install failed: {}\n", e));
      return VerificationResult::fail(unit, log);
    }

    let module = artifact
      .file_name()
      .parse::<DistFilename>()
      .map(|d| d.module_name())
      .unwrap_or_default();
    let handle = lease.env().handle();
    let vars = BTreeMap::from([
      ("python", handle.python.clone()),
      ("artifact", quote(&artifact.path.to_string_lossy())),
      ("module", module),
      ("source", quote(&self.source_dir.to_string_lossy())),
    ]);

    let script = match placeholder::substitute(&self.command, &vars) {
      Ok(script) => script,
      Err(e) => {
        log.push_str(&format!("invalid verification command: {}\n", e));
        return VerificationResult::fail(unit, log);
      }
    };

    let mut spec = CmdSpec::new(script).with_timeout(self.timeout);
    spec.env = handle.env.clone();

    match cmd::run(&spec).await {
      Ok(output) => {
        log.push_str(&output.combined());
        if output.timed_out {
          return VerificationResult::fail(unit, log);
        }
        if !output.success() {
          log.push_str(&format!("\nverification exited with code {:?}\n", output.code));
          return VerificationResult::fail(unit, log);
        }
        VerificationResult {
          unit,
          status: VerificationStatus::Pass,
          log,
        }
      }
      Err(e) => {
        log.push_str(&format!("failed to run verification: {}\n", e));
        VerificationResult::fail(unit, log)
      }
    }
  }
}
