//! Pipeline configuration (`wheelhouse.yml`).
//!
//! ```yaml
//! source_dir: .
//! artifacts_dir: artifacts
//! max_parallel: 2
//! matrix:
//!   python: ["3.7", "3.8"]
//!   arch: [x64, x86]
//!   kind: [wheel]
//!   generator: "Visual Studio 15 2017"
//! environment:
//!   manager: venv
//!   build_packages: [cmake, scikit-build, cython]
//! verify:
//!   packages: [pytest]
//!   command: "{python} -m pytest {source}/test/terra"
//!   timeout: 1800
//! publish:
//!   index: twine
//! ```
//!
//! Relative paths resolve against the directory holding the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::build::toolchain::{DEFAULT_SDIST_COMMAND, DEFAULT_WHEEL_COMMAND};
use crate::matrix::MatrixSpec;
use crate::platform::paths;
use crate::publish::http::DEFAULT_REPOSITORY_URL;
use crate::verify::DEFAULT_VERIFY_COMMAND;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {}: {source}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("invalid configuration: {0}")]
  Invalid(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerKind {
  #[default]
  Venv,
  Conda,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
  #[default]
  Http,
  Twine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentConfig {
  pub manager: ManagerKind,
  /// Interpreter overrides for venv, keyed by `"3.8-x86"` or `"3.8"`.
  pub interpreters: BTreeMap<String, String>,
  /// Installed into every build environment before building.
  pub build_packages: Vec<String>,
  /// conda-compatible executable.
  pub conda: String,
}

impl Default for EnvironmentConfig {
  fn default() -> Self {
    Self {
      manager: ManagerKind::default(),
      interpreters: BTreeMap::new(),
      build_packages: Vec::new(),
      conda: "conda".to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
  pub wheel_command: String,
  pub sdist_command: String,
  pub extra_args: Vec<String>,
  /// Generator for units whose matrix entry names none.
  pub generator: Option<String>,
  /// Seconds.
  pub timeout: Option<u64>,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      wheel_command: DEFAULT_WHEEL_COMMAND.to_string(),
      sdist_command: DEFAULT_SDIST_COMMAND.to_string(),
      extra_args: Vec::new(),
      generator: None,
      timeout: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerifyConfig {
  pub packages: Vec<String>,
  pub command: String,
  /// Seconds.
  pub timeout: Option<u64>,
}

impl Default for VerifyConfig {
  fn default() -> Self {
    Self {
      packages: Vec::new(),
      command: DEFAULT_VERIFY_COMMAND.to_string(),
      timeout: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
  pub index: IndexKind,
  pub repository_url: Option<String>,
  pub twine: String,
}

impl Default for PublishConfig {
  fn default() -> Self {
    Self {
      index: IndexKind::default(),
      repository_url: None,
      twine: "twine".to_string(),
    }
  }
}

impl PublishConfig {
  pub fn repository_url(&self) -> String {
    self
      .repository_url
      .clone()
      .unwrap_or_else(|| DEFAULT_REPOSITORY_URL.to_string())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
  pub source_dir: PathBuf,
  pub artifacts_dir: PathBuf,
  /// Environments and build outputs; defaults to [`paths::work_root`].
  pub work_dir: Option<PathBuf>,
  pub max_parallel: usize,
  pub matrix: MatrixSpec,
  pub environment: EnvironmentConfig,
  pub build: BuildConfig,
  pub verify: VerifyConfig,
  pub publish: PublishConfig,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      source_dir: PathBuf::from("."),
      artifacts_dir: PathBuf::from("artifacts"),
      work_dir: None,
      max_parallel: 1,
      matrix: MatrixSpec::default(),
      environment: EnvironmentConfig::default(),
      build: BuildConfig::default(),
      verify: VerifyConfig::default(),
      publish: PublishConfig::default(),
    }
  }
}

impl PipelineConfig {
  /// Load and validate a config file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let mut config: Self = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    let base = path.parent().unwrap_or(Path::new("."));
    config.resolve_paths(base);
    config.validate()?;
    Ok(config)
  }

  /// Make relative paths relative to `base`.
  pub fn resolve_paths(&mut self, base: &Path) {
    let resolve = |p: &mut PathBuf| {
      if p.is_relative() {
        *p = dunce::simplified(&base.join(&*p)).to_path_buf();
      }
    };
    resolve(&mut self.source_dir);
    resolve(&mut self.artifacts_dir);
    if let Some(work_dir) = &mut self.work_dir {
      resolve(work_dir);
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.max_parallel == 0 {
      return Err(ConfigError::Invalid("max_parallel must be at least 1".to_string()));
    }
    if self.verify.command.trim().is_empty() {
      return Err(ConfigError::Invalid("verify.command must not be empty".to_string()));
    }
    if self.build.timeout == Some(0) || self.verify.timeout == Some(0) {
      return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
    }
    Ok(())
  }

  pub fn work_root(&self) -> PathBuf {
    self.work_dir.clone().unwrap_or_else(paths::work_root)
  }

  /// The matrix with `build.generator` filled in where none was declared.
  pub fn effective_matrix(&self) -> MatrixSpec {
    let mut matrix = self.matrix.clone();
    if matrix.generator.is_empty()
      && let Some(generator) = &self.build.generator
    {
      matrix.generator = generator.clone();
    }
    matrix
  }

  pub fn build_timeout(&self) -> Option<Duration> {
    self.build.timeout.map(Duration::from_secs)
  }

  pub fn verify_timeout(&self) -> Option<Duration> {
    self.verify.timeout.map(Duration::from_secs)
  }
}
