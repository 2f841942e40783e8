//! Artifact builder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::toolchain::Toolchain;
use super::types::{Artifact, BuildError, BuildRequest};
use crate::consts::FORCE_32BIT_ENV_VAR;
use crate::dist::DistFilename;
use crate::env::EnvLease;
use crate::matrix::{BuildFlags, BuildKind, UnitId};
use crate::platform::Platform;
use crate::util::hash::hash_file;

/// Produces one artifact per unit inside that unit's build environment.
///
/// Every unit gets its own work directory under `builds_root`, wiped before
/// each build:
///
/// ```text
/// <builds_root>/<unit slug>/
///   dist/        # toolchain output
///   build.log    # toolchain stdout + stderr
/// ```
pub struct Builder {
  toolchain: Arc<dyn Toolchain>,
  source_dir: PathBuf,
  builds_root: PathBuf,
  extra_args: Vec<String>,
}

impl Builder {
  pub fn new(toolchain: Arc<dyn Toolchain>, source_dir: impl Into<PathBuf>, builds_root: impl Into<PathBuf>) -> Self {
    Self {
      toolchain,
      source_dir: source_dir.into(),
      builds_root: builds_root.into(),
      extra_args: Vec::new(),
    }
  }

  /// Extra arguments appended to every build command.
  pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
    self.extra_args = extra_args;
    self
  }

  pub fn source_dir(&self) -> &Path {
    &self.source_dir
  }

  pub fn unit_dir(&self, unit: &UnitId) -> PathBuf {
    self.builds_root.join(unit.slug())
  }

  pub fn log_path(&self, unit: &UnitId) -> PathBuf {
    self.unit_dir(unit).join("build.log")
  }

  /// Build a `build_kind` artifact in the leased environment.
  ///
  /// The toolchain log is written to [`Builder::log_path`] whenever the
  /// toolchain ran, successful or not.
  pub async fn build(
    &self,
    lease: &EnvLease,
    build_kind: BuildKind,
    toolchain_generator: &str,
  ) -> Result<Artifact, BuildError> {
    let env = lease.env();
    let unit = UnitId {
      interpreter_version: env.interpreter_version(),
      architecture: env.architecture(),
      build_kind,
    };
    let flags = BuildFlags {
      force_32bit: unit.architecture.is_32bit(),
    };

    let unit_dir = self.unit_dir(&unit);
    let out_dir = unit_dir.join("dist");
    match tokio::fs::remove_dir_all(&unit_dir).await {
      Ok(()) => debug!(unit = %unit, "wiped previous build output"),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(&out_dir).await?;

    let mut request_env = env.handle().env.clone();
    let mut extra_args = Vec::new();
    if flags.force_32bit {
      request_env.insert(FORCE_32BIT_ENV_VAR.to_string(), "1".to_string());
      if !toolchain_generator.is_empty() {
        extra_args.push("-A".to_string());
        extra_args.push(unit.architecture.generator_platform().to_string());
      }
    }
    extra_args.extend(self.extra_args.iter().cloned());

    let request = BuildRequest {
      unit,
      flags,
      python: env.handle().python.clone(),
      env: request_env,
      out_dir: out_dir.clone(),
    };

    info!(unit = %unit, env = %env.name(), generator = %toolchain_generator, "building");
    let output = self
      .toolchain
      .invoke_build(&self.source_dir, toolchain_generator, &extra_args, &request)
      .await?;
    tokio::fs::write(self.log_path(&unit), &output.log).await?;

    if output.exit_code != Some(0) {
      if let Some(module) = missing_module(&output.log) {
        return Err(BuildError::MissingDependency { module, log: output.log });
      }
      return Err(BuildError::ToolchainExit {
        code: output.exit_code,
        log: output.log,
      });
    }

    let path = match output.artifact_paths.as_slice() {
      [] => {
        return Err(BuildError::NoArtifact {
          kind: build_kind,
          dir: out_dir,
        });
      }
      [path] => path.clone(),
      paths => {
        return Err(BuildError::AmbiguousArtifacts {
          kind: build_kind,
          paths: paths.to_vec(),
        });
      }
    };

    if build_kind == BuildKind::Wheel {
      check_platform_tag(&path, &unit);
    }

    let sha256 = hash_file(&path)?;
    let size = tokio::fs::metadata(&path).await?.len();

    info!(unit = %unit, artifact = %path.display(), size, "build succeeded");
    Ok(Artifact {
      path,
      unit,
      kind: build_kind,
      sha256,
      size,
    })
  }
}

/// Module named by the first `No module named '...'` line of a build log.
fn missing_module(log: &str) -> Option<String> {
  let rest = log.split("No module named ").nth(1)?;
  let name: String = rest
    .trim_start_matches(['\'', '"'])
    .chars()
    .take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '.'))
    .collect();
  (!name.is_empty()).then_some(name)
}

fn check_platform_tag(path: &Path, unit: &UnitId) {
  let Some(platform) = Platform::host(unit.architecture) else {
    return;
  };
  let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();

  match file_name.parse::<DistFilename>() {
    Ok(dist) if !dist.targets_platform(platform.wheel_tag()) => {
      warn!(
        unit = %unit,
        wheel = %file_name,
        expected = platform.wheel_tag(),
        "wheel platform tag does not match unit architecture"
      );
    }
    Ok(_) => {}
    Err(e) => warn!(unit = %unit, error = %e, "could not parse wheel filename"),
  }
}
