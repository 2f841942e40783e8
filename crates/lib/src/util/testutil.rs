//! Recording fakes for the external collaborators.
//!
//! Each fake keeps a log of what it was asked to do so tests can assert on
//! environment lifecycles, toolchain invocations and uploads without a real
//! interpreter, compiler or index.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::build::{BuildError, BuildRequest, Toolchain, ToolchainOutput};
use crate::env::{EnvHandle, EnvManager, ProvisionError};
use crate::matrix::{BuildFlags, BuildKind, PythonVersion};
use crate::platform::Platform;
use crate::platform::arch::Arch;
use crate::publish::{Credentials, PackageIndex, UploadError};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Default)]
struct EnvState {
  created: Vec<String>,
  created_32bit: Vec<String>,
  destroyed: Vec<String>,
  installed: BTreeMap<String, Vec<String>>,
  live: HashSet<String>,
  max_live: usize,
}

/// In-memory environment manager.
#[derive(Debug, Default)]
pub struct FakeEnvManager {
  missing_pythons: Vec<String>,
  unresolvable: Vec<String>,
  undestroyable: Vec<String>,
  delay: Option<Duration>,
  state: Mutex<EnvState>,
}

impl FakeEnvManager {
  /// Interpreter `version` cannot be found.
  pub fn without_python(mut self, version: &str) -> Self {
    self.missing_pythons.push(version.to_string());
    self
  }

  /// Installing any spec containing `pattern` fails.
  pub fn unresolvable(mut self, pattern: &str) -> Self {
    self.unresolvable.push(pattern.to_string());
    self
  }

  /// Destroying environment `name` fails.
  pub fn undestroyable(mut self, name: &str) -> Self {
    self.undestroyable.push(name.to_string());
    self
  }

  /// Creation takes this long, so concurrent units overlap.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn created(&self) -> Vec<String> {
    lock(&self.state).created.clone()
  }

  pub fn created_32bit(&self) -> Vec<String> {
    lock(&self.state).created_32bit.clone()
  }

  /// How often `name` was destroyed.
  pub fn destroyed(&self, name: &str) -> usize {
    lock(&self.state).destroyed.iter().filter(|n| *n == name).count()
  }

  pub fn installed(&self, name: &str) -> Vec<String> {
    lock(&self.state).installed.get(name).cloned().unwrap_or_default()
  }

  /// Environments currently alive.
  pub fn live(&self) -> usize {
    lock(&self.state).live.len()
  }

  /// Highest number of environments alive at the same time.
  pub fn max_live(&self) -> usize {
    lock(&self.state).max_live
  }
}

#[async_trait]
impl EnvManager for FakeEnvManager {
  fn kind(&self) -> &'static str {
    "fake"
  }

  async fn create_env(
    &self,
    name: &str,
    interpreter_version: PythonVersion,
    flags: BuildFlags,
  ) -> Result<EnvHandle, ProvisionError> {
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    if self.missing_pythons.contains(&interpreter_version.to_string()) {
      return Err(ProvisionError::InterpreterUnavailable {
        version: interpreter_version,
        arch: if flags.force_32bit { Arch::X86 } else { Arch::X64 },
        message: "not installed".to_string(),
      });
    }

    let mut state = lock(&self.state);
    state.created.push(name.to_string());
    if flags.force_32bit {
      state.created_32bit.push(name.to_string());
    }
    state.live.insert(name.to_string());
    state.max_live = state.max_live.max(state.live.len());

    Ok(EnvHandle {
      name: name.to_string(),
      location: None,
      python: "python".to_string(),
      env: BTreeMap::new(),
    })
  }

  async fn install(&self, handle: &EnvHandle, package_specs: &[String]) -> Result<(), ProvisionError> {
    if let Some(bad) = package_specs
      .iter()
      .find(|spec| self.unresolvable.iter().any(|p| spec.contains(p.as_str())))
    {
      return Err(ProvisionError::PackageResolution {
        env: handle.name.clone(),
        packages: package_specs.to_vec(),
        message: format!("no matching distribution for {}", bad),
      });
    }

    lock(&self.state)
      .installed
      .entry(handle.name.clone())
      .or_default()
      .extend(package_specs.iter().cloned());
    Ok(())
  }

  async fn destroy(&self, handle: &EnvHandle) -> Result<(), ProvisionError> {
    let mut state = lock(&self.state);
    state.live.remove(&handle.name);
    if self.undestroyable.contains(&handle.name) {
      return Err(ProvisionError::Teardown {
        env: handle.name.clone(),
        message: "device busy".to_string(),
      });
    }
    state.destroyed.push(handle.name.clone());
    Ok(())
  }
}

/// One recorded toolchain invocation.
#[derive(Debug, Clone)]
pub struct ToolchainCall {
  pub request: BuildRequest,
  pub generator: String,
  pub extra_args: Vec<String>,
  pub force_32bit: bool,
  pub env: BTreeMap<String, String>,
}

/// Toolchain that writes placeholder distributions.
#[derive(Debug)]
pub struct FakeToolchain {
  failing: Vec<Arch>,
  panicking: Vec<Arch>,
  missing_module: Option<String>,
  artifacts: usize,
  cancel_on_build: Option<watch::Sender<bool>>,
  calls: Mutex<Vec<ToolchainCall>>,
}

impl Default for FakeToolchain {
  fn default() -> Self {
    Self {
      failing: Vec::new(),
      panicking: Vec::new(),
      missing_module: None,
      artifacts: 1,
      cancel_on_build: None,
      calls: Mutex::new(Vec::new()),
    }
  }
}

impl FakeToolchain {
  /// Builds for `arch` exit non-zero.
  pub fn failing(mut self, arch: Arch) -> Self {
    self.failing.push(arch);
    self
  }

  /// Builds for `arch` panic.
  pub fn panicking(mut self, arch: Arch) -> Self {
    self.panicking.push(arch);
    self
  }

  /// Every build fails with a missing-module traceback.
  pub fn missing_module(mut self, module: &str) -> Self {
    self.missing_module = Some(module.to_string());
    self
  }

  /// Number of distributions each build writes.
  pub fn producing(mut self, count: usize) -> Self {
    self.artifacts = count;
    self
  }

  /// Every build fires `cancel` while it runs, then completes normally.
  pub fn cancelling(mut self, cancel: watch::Sender<bool>) -> Self {
    self.cancel_on_build = Some(cancel);
    self
  }

  pub fn calls(&self) -> Vec<ToolchainCall> {
    lock(&self.calls).clone()
  }

  fn file_name(request: &BuildRequest, n: usize) -> String {
    let unit = &request.unit;
    let suffix = if n == 0 { String::new() } else { format!(".post{}", n) };
    match unit.build_kind {
      BuildKind::Wheel => {
        let tag = Platform::host(unit.architecture)
          .map(|p| p.wheel_tag())
          .unwrap_or("any");
        let py = unit.interpreter_version.cp_tag();
        format!("demo-1.0{}-{}-{}-{}.whl", suffix, py, py, tag)
      }
      BuildKind::Sdist => format!("demo-1.0{}.tar.gz", suffix),
    }
  }
}

#[async_trait]
impl Toolchain for FakeToolchain {
  async fn invoke_build(
    &self,
    _source_dir: &Path,
    generator: &str,
    extra_args: &[String],
    request: &BuildRequest,
  ) -> Result<ToolchainOutput, BuildError> {
    lock(&self.calls).push(ToolchainCall {
      request: request.clone(),
      generator: generator.to_string(),
      extra_args: extra_args.to_vec(),
      force_32bit: request.flags.force_32bit,
      env: request.env.clone(),
    });

    if let Some(cancel) = &self.cancel_on_build {
      cancel.send_replace(true);
    }

    let arch = request.unit.architecture;
    if self.panicking.contains(&arch) {
      panic!("toolchain crashed for {}", request.unit);
    }
    if self.failing.contains(&arch) {
      return Ok(ToolchainOutput {
        exit_code: Some(1),
        artifact_paths: Vec::new(),
        log: format!("error: compiler failed for {}\n", request.unit),
      });
    }
    if let Some(module) = &self.missing_module {
      return Ok(ToolchainOutput {
        exit_code: Some(1),
        artifact_paths: Vec::new(),
        log: format!("ModuleNotFoundError: No module named '{}'\n", module),
      });
    }

    let mut artifact_paths = Vec::new();
    for n in 0..self.artifacts {
      let path = request.out_dir.join(Self::file_name(request, n));
      tokio::fs::write(&path, format!("{} {}", request.unit, n)).await?;
      artifact_paths.push(path);
    }

    Ok(ToolchainOutput {
      exit_code: Some(0),
      artifact_paths,
      log: format!("built {}\n", request.unit),
    })
  }
}

/// Package index that records uploads.
#[derive(Debug, Default)]
pub struct FakeIndex {
  rejecting: Vec<String>,
  unreachable: Vec<String>,
  attempts: Mutex<Vec<PathBuf>>,
  uploads: Mutex<Vec<PathBuf>>,
}

impl FakeIndex {
  /// Uploads of paths containing `pattern` fail authentication.
  pub fn rejecting(mut self, pattern: &str) -> Self {
    self.rejecting.push(pattern.to_string());
    self
  }

  /// Uploads of paths containing `pattern` fail in transport.
  pub fn unreachable(mut self, pattern: &str) -> Self {
    self.unreachable.push(pattern.to_string());
    self
  }

  /// Successful uploads, in order.
  pub fn uploads(&self) -> Vec<PathBuf> {
    lock(&self.uploads).clone()
  }

  pub fn attempts(&self) -> usize {
    lock(&self.attempts).len()
  }
}

#[async_trait]
impl PackageIndex for FakeIndex {
  fn location(&self) -> String {
    "fake://index".to_string()
  }

  async fn upload(&self, artifact_path: &Path, _credentials: &Credentials) -> Result<(), UploadError> {
    lock(&self.attempts).push(artifact_path.to_path_buf());
    let path = artifact_path.to_string_lossy();

    if self.rejecting.iter().any(|p| path.contains(p.as_str())) {
      return Err(UploadError::Authentication("403 Forbidden".to_string()));
    }
    if self.unreachable.iter().any(|p| path.contains(p.as_str())) {
      return Err(UploadError::Transport("connection reset".to_string()));
    }

    lock(&self.uploads).push(artifact_path.to_path_buf());
    Ok(())
  }
}
