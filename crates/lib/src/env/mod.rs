//! Environment provisioning.
//!
//! Isolated, named environments are created for one interpreter version and
//! word size, used by exactly one build unit step, and destroyed afterwards.
//! The [`Provisioner`] owns the lifecycle; an [`EnvManager`] does the actual
//! work (`venv`, conda, or a test fake).

pub mod conda;
pub mod provisioner;
pub mod registry;
pub mod types;
pub mod venv;

pub use conda::CondaManager;
pub use provisioner::{EnvLease, Provisioner};
pub use registry::EnvRegistry;
pub use types::{EnvHandle, EnvManager, EnvRequest, Environment, ProvisionError};
pub use venv::VenvManager;

use crate::cmd::{self, CmdSpec, quote};

/// `pip install` into an environment through its own interpreter.
pub(crate) async fn pip_install(handle: &EnvHandle, package_specs: &[String]) -> Result<(), ProvisionError> {
  if package_specs.is_empty() {
    return Ok(());
  }

  let args: Vec<String> = package_specs.iter().map(|p| quote(p)).collect();
  let mut spec = CmdSpec::new(format!(
    "{} -m pip install --disable-pip-version-check --no-input {}",
    handle.python,
    args.join(" ")
  ));
  spec.env = handle.env.clone();

  let output = cmd::run(&spec).await?;
  if !output.success() {
    return Err(ProvisionError::PackageResolution {
      env: handle.name.clone(),
      packages: package_specs.to_vec(),
      message: output.combined().trim().to_string(),
    });
  }
  Ok(())
}
