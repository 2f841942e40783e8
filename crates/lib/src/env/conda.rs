//! conda-backed environments.
//!
//! Environments are named conda envs. 32-bit units export
//! `CONDA_FORCE_32BIT=1` to every conda invocation so the solver picks
//! 32-bit interpreters and packages.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::types::{EnvHandle, EnvManager, ProvisionError};
use crate::cmd::{self, CmdSpec, quote};
use crate::consts::FORCE_32BIT_ENV_VAR;
use crate::matrix::{BuildFlags, PythonVersion};
use crate::platform::arch::Arch;

pub struct CondaManager {
  conda: String,
}

impl CondaManager {
  /// `conda` names the executable, e.g. `conda`, `mamba` or a full path.
  pub fn new(conda: impl Into<String>) -> Self {
    Self { conda: conda.into() }
  }

  fn flag_env(flags: BuildFlags) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    if flags.force_32bit {
      env.insert("CONDA_FORCE_32BIT".to_string(), "1".to_string());
      env.insert(FORCE_32BIT_ENV_VAR.to_string(), "1".to_string());
    }
    env
  }

  fn create_script(&self, name: &str, version: PythonVersion) -> String {
    format!(
      "{} create --yes --quiet --name {} python={}",
      quote(&self.conda),
      quote(name),
      version
    )
  }

  fn python_cmd(&self, name: &str) -> String {
    format!("{} run --no-capture-output --name {} python", quote(&self.conda), quote(name))
  }

  fn remove_script(&self, name: &str) -> String {
    format!("{} env remove --yes --name {}", quote(&self.conda), quote(name))
  }
}

impl Default for CondaManager {
  fn default() -> Self {
    Self::new("conda")
  }
}

#[async_trait]
impl EnvManager for CondaManager {
  fn kind(&self) -> &'static str {
    "conda"
  }

  async fn create_env(
    &self,
    name: &str,
    interpreter_version: PythonVersion,
    flags: BuildFlags,
  ) -> Result<EnvHandle, ProvisionError> {
    let env = Self::flag_env(flags);
    let mut spec = CmdSpec::new(self.create_script(name, interpreter_version));
    spec.env = env.clone();

    let output = cmd::run(&spec).await?;
    if !output.success() {
      return Err(ProvisionError::InterpreterUnavailable {
        version: interpreter_version,
        arch: if flags.force_32bit { Arch::X86 } else { Arch::X64 },
        message: output.combined().trim().to_string(),
      });
    }

    Ok(EnvHandle {
      name: name.to_string(),
      location: None,
      python: self.python_cmd(name),
      env,
    })
  }

  async fn install(&self, handle: &EnvHandle, package_specs: &[String]) -> Result<(), ProvisionError> {
    super::pip_install(handle, package_specs).await
  }

  async fn destroy(&self, handle: &EnvHandle) -> Result<(), ProvisionError> {
    let output = cmd::run(&CmdSpec::new(self.remove_script(&handle.name))).await?;
    if !output.success() {
      return Err(ProvisionError::Teardown {
        env: handle.name.clone(),
        message: output.combined().trim().to_string(),
      });
    }
    Ok(())
  }
}
