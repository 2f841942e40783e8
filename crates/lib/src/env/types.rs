//! Environment types and errors.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::cmd::CmdError;
use crate::matrix::{BuildFlags, PythonVersion};
use crate::platform::arch::Arch;

/// Errors raised while creating, populating or tearing down an environment.
#[derive(Debug, Error)]
pub enum ProvisionError {
  /// The requested interpreter could not be located or instantiated.
  #[error("python {version} ({arch}) is unavailable: {message}")]
  InterpreterUnavailable {
    version: PythonVersion,
    arch: Arch,
    message: String,
  },

  /// One or more package specs failed to resolve or install.
  #[error("failed to install {packages:?} into '{env}': {message}")]
  PackageResolution {
    env: String,
    packages: Vec<String>,
    message: String,
  },

  /// An environment with this name is already live.
  #[error("environment '{0}' already exists")]
  NameInUse(String),

  /// The environment manager failed to remove an environment.
  #[error("failed to destroy environment '{env}': {message}")]
  Teardown { env: String, message: String },

  #[error(transparent)]
  Cmd(#[from] CmdError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Manager-specific reference to a created environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvHandle {
  pub name: String,
  /// On-disk location, when the manager exposes one.
  pub location: Option<PathBuf>,
  /// Shell-ready command that runs the environment's interpreter.
  pub python: String,
  /// Variables every command run inside the environment must see.
  pub env: BTreeMap<String, String>,
}

/// An isolated, disposable execution context.
///
/// Only the provisioner constructs these, and only while the backing
/// environment is live.
#[derive(Debug, Clone, Serialize)]
pub struct Environment {
  pub(crate) name: String,
  pub(crate) interpreter_version: PythonVersion,
  pub(crate) architecture: Arch,
  pub(crate) package_set: Vec<String>,
  pub(crate) handle: EnvHandle,
}

impl Environment {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn interpreter_version(&self) -> PythonVersion {
    self.interpreter_version
  }

  pub fn architecture(&self) -> Arch {
    self.architecture
  }

  /// Installed package specs, in installation order.
  pub fn package_set(&self) -> &[String] {
    &self.package_set
  }

  pub fn handle(&self) -> &EnvHandle {
    &self.handle
  }
}

/// What to provision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvRequest {
  pub name: String,
  pub interpreter_version: PythonVersion,
  pub flags: BuildFlags,
  pub packages: Vec<String>,
}

impl EnvRequest {
  pub fn architecture(&self) -> Arch {
    if self.flags.force_32bit { Arch::X86 } else { Arch::X64 }
  }
}

/// The interpreter/environment manager collaborator.
#[async_trait]
pub trait EnvManager: Send + Sync {
  /// Short identifier for logs (`venv`, `conda`, ...).
  fn kind(&self) -> &'static str;

  async fn create_env(
    &self,
    name: &str,
    interpreter_version: PythonVersion,
    flags: BuildFlags,
  ) -> Result<EnvHandle, ProvisionError>;

  async fn install(&self, handle: &EnvHandle, package_specs: &[String]) -> Result<(), ProvisionError>;

  async fn destroy(&self, handle: &EnvHandle) -> Result<(), ProvisionError>;
}
