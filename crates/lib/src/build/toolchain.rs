//! The native build toolchain collaborator.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use walkdir::WalkDir;

use super::types::{BuildError, BuildRequest, ToolchainOutput};
use crate::cmd::{self, CmdSpec, quote};
use crate::matrix::BuildKind;
use crate::placeholder;

pub const DEFAULT_WHEEL_COMMAND: &str = "{python} setup.py bdist_wheel --dist-dir {out} -- {cmake_args}";
pub const DEFAULT_SDIST_COMMAND: &str = "{python} setup.py sdist --dist-dir {out}";

#[async_trait]
pub trait Toolchain: Send + Sync {
  /// Build `request.unit` from `source_dir` into `request.out_dir`.
  ///
  /// A failing build is reported through `exit_code`, not as an error.
  async fn invoke_build(
    &self,
    source_dir: &Path,
    generator: &str,
    extra_args: &[String],
    request: &BuildRequest,
  ) -> Result<ToolchainOutput, BuildError>;
}

/// Runs a configurable shell command per build kind.
///
/// Templates may use `{python}`, `{source}`, `{out}`, `{generator}`,
/// `{extra}` and `{cmake_args}` (`-G <generator>` followed by the extra
/// arguments).
#[derive(Debug, Clone)]
pub struct CommandToolchain {
  pub wheel_command: String,
  pub sdist_command: String,
  pub timeout: Option<Duration>,
}

impl Default for CommandToolchain {
  fn default() -> Self {
    Self {
      wheel_command: DEFAULT_WHEEL_COMMAND.to_string(),
      sdist_command: DEFAULT_SDIST_COMMAND.to_string(),
      timeout: None,
    }
  }
}

impl CommandToolchain {
  /// Render the command for a request.
  pub fn render(
    &self,
    source_dir: &Path,
    generator: &str,
    extra_args: &[String],
    request: &BuildRequest,
  ) -> Result<String, BuildError> {
    let template = match request.unit.build_kind {
      BuildKind::Wheel => &self.wheel_command,
      BuildKind::Sdist => &self.sdist_command,
    };

    let extra: Vec<String> = extra_args.iter().map(|a| quote(a)).collect();
    let mut cmake_args = Vec::new();
    if !generator.is_empty() {
      cmake_args.push("-G".to_string());
      cmake_args.push(quote(generator));
    }
    cmake_args.extend(extra.iter().cloned());

    let vars = BTreeMap::from([
      ("python", request.python.clone()),
      ("source", quote(&source_dir.to_string_lossy())),
      ("out", quote(&request.out_dir.to_string_lossy())),
      ("generator", generator.to_string()),
      ("extra", extra.join(" ")),
      ("cmake_args", cmake_args.join(" ")),
    ]);

    Ok(placeholder::substitute(template, &vars)?.trim_end().to_string())
  }
}

#[async_trait]
impl Toolchain for CommandToolchain {
  async fn invoke_build(
    &self,
    source_dir: &Path,
    generator: &str,
    extra_args: &[String],
    request: &BuildRequest,
  ) -> Result<ToolchainOutput, BuildError> {
    let script = self.render(source_dir, generator, extra_args, request)?;

    let mut spec = CmdSpec::new(script)
      .with_cwd(source_dir)
      .with_timeout(self.timeout);
    spec.env = request.env.clone();

    let output = cmd::run(&spec).await?;
    let artifact_paths = if output.success() {
      find_distributions(&request.out_dir, request.unit.build_kind)?
    } else {
      Vec::new()
    };

    Ok(ToolchainOutput {
      exit_code: output.code,
      artifact_paths,
      log: output.combined(),
    })
  }
}

/// Distribution files of `kind` directly inside `dir`, sorted by name.
pub fn find_distributions(dir: &Path, kind: BuildKind) -> Result<Vec<PathBuf>, BuildError> {
  let mut found = Vec::new();
  if !dir.exists() {
    return Ok(found);
  }

  for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
    let entry = entry.map_err(|e| BuildError::Io(std::io::Error::other(e.to_string())))?;
    if entry.file_type().is_file() && kind.matches_file(&entry.file_name().to_string_lossy()) {
      debug!(path = %entry.path().display(), "found distribution");
      found.push(entry.into_path());
    }
  }

  Ok(found)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::matrix::{BuildFlags, PythonVersion, UnitId};
  use crate::platform::arch::Arch;
  use tempfile::TempDir;

  fn request(kind: BuildKind, out_dir: &Path) -> BuildRequest {
    BuildRequest {
      unit: UnitId {
        interpreter_version: PythonVersion::new(3, 8),
        architecture: Arch::X86,
        build_kind: kind,
      },
      flags: BuildFlags { force_32bit: true },
      python: "/envs/build/bin/python".to_string(),
      env: BTreeMap::new(),
      out_dir: out_dir.to_path_buf(),
    }
  }

  #[test]
  fn default_wheel_command_passes_generator() {
    let toolchain = CommandToolchain::default();
    let cmd = toolchain
      .render(
        Path::new("/src"),
        "Visual Studio 15 2017",
        &["-A".to_string(), "Win32".to_string()],
        &request(BuildKind::Wheel, Path::new("/out")),
      )
      .unwrap();

    assert_eq!(
      cmd,
      "/envs/build/bin/python setup.py bdist_wheel --dist-dir /out -- -G 'Visual Studio 15 2017' -A Win32"
    );
  }

  #[test]
  fn empty_generator_adds_no_flag() {
    let toolchain = CommandToolchain::default();
    let cmd = toolchain
      .render(Path::new("/src"), "", &[], &request(BuildKind::Wheel, Path::new("/out")))
      .unwrap();

    assert_eq!(cmd, "/envs/build/bin/python setup.py bdist_wheel --dist-dir /out --");
  }

  #[test]
  fn sdist_uses_its_own_template() {
    let toolchain = CommandToolchain::default();
    let cmd = toolchain
      .render(Path::new("/src"), "Ninja", &[], &request(BuildKind::Sdist, Path::new("/out")))
      .unwrap();

    assert_eq!(cmd, "/envs/build/bin/python setup.py sdist --dist-dir /out");
  }

  #[test]
  fn unknown_placeholder_is_rejected() {
    let toolchain = CommandToolchain {
      wheel_command: "{python} -m build {nope}".to_string(),
      ..Default::default()
    };
    let result = toolchain.render(Path::new("/src"), "", &[], &request(BuildKind::Wheel, Path::new("/out")));

    assert!(matches!(result, Err(BuildError::Template(_))));
  }

  #[test]
  fn finds_only_requested_kind() {
    let temp = TempDir::new().unwrap();
    for name in ["b-1.0-cp38-cp38-win32.whl", "a-1.0-cp38-cp38-win32.whl", "a-1.0.tar.gz", "notes.txt"] {
      std::fs::write(temp.path().join(name), b"x").unwrap();
    }

    let wheels = find_distributions(temp.path(), BuildKind::Wheel).unwrap();
    let names: Vec<_> = wheels.iter().map(|p| p.file_name().unwrap().to_owned()).collect();
    assert_eq!(names, vec!["a-1.0-cp38-cp38-win32.whl", "b-1.0-cp38-cp38-win32.whl"]);

    assert_eq!(find_distributions(temp.path(), BuildKind::Sdist).unwrap().len(), 1);
    assert!(find_distributions(&temp.path().join("missing"), BuildKind::Wheel).unwrap().is_empty());
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn invoke_build_discovers_outputs() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("dist");
    std::fs::create_dir_all(&out).unwrap();

    let toolchain = CommandToolchain {
      sdist_command: "echo building && touch {out}/demo-1.0.tar.gz".to_string(),
      ..Default::default()
    };
    let output = toolchain
      .invoke_build(temp.path(), "", &[], &request(BuildKind::Sdist, &out))
      .await
      .unwrap();

    assert_eq!(output.exit_code, Some(0));
    assert_eq!(output.artifact_paths, vec![out.join("demo-1.0.tar.gz")]);
    assert!(output.log.contains("building"));
  }

  #[tokio::test]
  #[cfg(unix)]
  async fn failing_build_reports_exit_code() {
    let temp = TempDir::new().unwrap();
    let toolchain = CommandToolchain {
      sdist_command: "echo 'error: boom' >&2; exit 4".to_string(),
      ..Default::default()
    };
    let output = toolchain
      .invoke_build(temp.path(), "", &[], &request(BuildKind::Sdist, temp.path()))
      .await
      .unwrap();

    assert_eq!(output.exit_code, Some(4));
    assert!(output.artifact_paths.is_empty());
    assert!(output.log.contains("boom"));
  }
}
