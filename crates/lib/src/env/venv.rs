//! `venv`-backed environments.
//!
//! Each environment is a directory under the work root created with
//! `<python> -m venv`. Packages are installed with the environment's own pip.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::types::{EnvHandle, EnvManager, ProvisionError};
use crate::cmd::{self, CmdSpec, quote};
use crate::consts::FORCE_32BIT_ENV_VAR;
use crate::matrix::{BuildFlags, PythonVersion};
use crate::platform::arch::Arch;
use crate::platform::os::Os;

pub struct VenvManager {
  root: PathBuf,
  /// Interpreter overrides keyed by `"<version>-<arch>"` or `"<version>"`.
  interpreters: BTreeMap<String, String>,
  os: Os,
}

impl VenvManager {
  pub fn new(root: impl Into<PathBuf>, interpreters: BTreeMap<String, String>) -> Self {
    Self {
      root: root.into(),
      interpreters,
      os: Os::current().unwrap_or(Os::Linux),
    }
  }

  fn env_dir(&self, name: &str) -> PathBuf {
    self.root.join(name)
  }

  /// Command that launches the base interpreter for a version and word size.
  ///
  /// Configured overrides win; otherwise the Windows `py` launcher or a
  /// `pythonX.Y` executable on PATH is used.
  pub fn interpreter_for(&self, version: PythonVersion, arch: Arch) -> String {
    let keyed = format!("{}-{}", version.short(), arch);
    if let Some(path) = self
      .interpreters
      .get(&keyed)
      .or_else(|| self.interpreters.get(&version.short()))
    {
      return quote(path);
    }

    match self.os {
      Os::Windows if arch.is_32bit() => format!("py -{}-32", version.short()),
      Os::Windows => format!("py -{}", version.short()),
      Os::Linux | Os::MacOs => format!("python{}", version.short()),
    }
  }

  fn env_python(&self, dir: &Path) -> PathBuf {
    dir
      .join(self.os.venv_bin_dir())
      .join(format!("python{}", self.os.exe_suffix()))
  }
}

#[async_trait]
impl EnvManager for VenvManager {
  fn kind(&self) -> &'static str {
    "venv"
  }

  async fn create_env(
    &self,
    name: &str,
    interpreter_version: PythonVersion,
    flags: BuildFlags,
  ) -> Result<EnvHandle, ProvisionError> {
    let arch = if flags.force_32bit { Arch::X86 } else { Arch::X64 };
    let dir = self.env_dir(name);

    // Start from a clean directory; a stale one would leak packages across units.
    match tokio::fs::remove_dir_all(&dir).await {
      Ok(()) => debug!(env = %name, "removed stale environment directory"),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => return Err(e.into()),
    }
    tokio::fs::create_dir_all(&self.root).await?;

    let base = self.interpreter_for(interpreter_version, arch);
    let output = cmd::run(&CmdSpec::new(format!(
      "{} -m venv {}",
      base,
      quote(&dir.to_string_lossy())
    )))
    .await?;

    if !output.success() {
      return Err(ProvisionError::InterpreterUnavailable {
        version: interpreter_version,
        arch,
        message: output.combined().trim().to_string(),
      });
    }

    let mut env = BTreeMap::new();
    env.insert("VIRTUAL_ENV".to_string(), dir.to_string_lossy().into_owned());
    if flags.force_32bit {
      env.insert(FORCE_32BIT_ENV_VAR.to_string(), "1".to_string());
    }

    Ok(EnvHandle {
      name: name.to_string(),
      python: quote(&self.env_python(&dir).to_string_lossy()),
      location: Some(dir),
      env,
    })
  }

  async fn install(&self, handle: &EnvHandle, package_specs: &[String]) -> Result<(), ProvisionError> {
    super::pip_install(handle, package_specs).await
  }

  async fn destroy(&self, handle: &EnvHandle) -> Result<(), ProvisionError> {
    let Some(dir) = &handle.location else {
      return Ok(());
    };
    match tokio::fs::remove_dir_all(dir).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(ProvisionError::Teardown {
        env: handle.name.clone(),
        message: e.to_string(),
      }),
    }
  }
}
