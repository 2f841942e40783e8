//! Distribution filenames.
//!
//! Wheels are named `{name}-{version}(-{build})?-{python}-{abi}-{platform}.whl`
//! and source distributions `{name}-{version}.tar.gz` (or `.zip`). The index
//! upload needs the name, version and python tag; the builder checks the
//! platform tag of every wheel it produces.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::matrix::BuildKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistFilenameError {
  #[error("'{0}' is not a wheel or source distribution")]
  UnknownExtension(String),

  #[error("malformed distribution filename '{0}'")]
  Malformed(String),
}

/// The parts of a distribution filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DistFilename {
  pub kind: BuildKind,
  pub name: String,
  pub version: String,
  pub build_tag: Option<String>,
  /// `None` for source distributions.
  pub python_tag: Option<String>,
  pub abi_tag: Option<String>,
  pub platform_tag: Option<String>,
}

impl DistFilename {
  /// Value of the `filetype` upload field.
  pub fn filetype(&self) -> &'static str {
    match self.kind {
      BuildKind::Wheel => "bdist_wheel",
      BuildKind::Sdist => "sdist",
    }
  }

  /// Value of the `pyversion` upload field.
  pub fn pyversion(&self) -> &str {
    self.python_tag.as_deref().unwrap_or("source")
  }

  /// Importable module name derived from the distribution name.
  pub fn module_name(&self) -> String {
    self.name.replace(['-', '.'], "_").to_lowercase()
  }

  /// Whether every platform in a (possibly compressed) platform tag ends
  /// with `suffix`, e.g. `win_amd64` or `x86_64`. Source distributions and
  /// pure wheels (`any`) match every platform.
  pub fn targets_platform(&self, suffix: &str) -> bool {
    match self.platform_tag.as_deref() {
      None | Some("any") => true,
      Some(tag) => tag.split('.').all(|p| p.ends_with(suffix)),
    }
  }
}

impl FromStr for DistFilename {
  type Err = DistFilenameError;

  fn from_str(file_name: &str) -> Result<Self, Self::Err> {
    let malformed = || DistFilenameError::Malformed(file_name.to_string());

    if let Some(stem) = file_name.strip_suffix(".whl") {
      let parts: Vec<&str> = stem.split('-').collect();
      let (name, version, build_tag, rest) = match parts.as_slice() {
        [name, version, py, abi, plat] => (name, version, None, [py, abi, plat]),
        [name, version, build, py, abi, plat] => (name, version, Some(build.to_string()), [py, abi, plat]),
        _ => return Err(malformed()),
      };
      if name.is_empty() || version.is_empty() || rest.iter().any(|p| p.is_empty()) {
        return Err(malformed());
      }
      return Ok(Self {
        kind: BuildKind::Wheel,
        name: name.to_string(),
        version: version.to_string(),
        build_tag,
        python_tag: Some(rest[0].to_string()),
        abi_tag: Some(rest[1].to_string()),
        platform_tag: Some(rest[2].to_string()),
      });
    }

    let stem = file_name
      .strip_suffix(".tar.gz")
      .or_else(|| file_name.strip_suffix(".zip"))
      .ok_or_else(|| DistFilenameError::UnknownExtension(file_name.to_string()))?;

    // Names may contain dashes; the version never does.
    let (name, version) = stem.rsplit_once('-').ok_or_else(malformed)?;
    if name.is_empty() || version.is_empty() {
      return Err(malformed());
    }

    Ok(Self {
      kind: BuildKind::Sdist,
      name: name.to_string(),
      version: version.to_string(),
      build_tag: None,
      python_tag: None,
      abi_tag: None,
      platform_tag: None,
    })
  }
}

impl fmt::Display for DistFilename {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {} ({})", self.name, self.version, self.filetype())
  }
}
