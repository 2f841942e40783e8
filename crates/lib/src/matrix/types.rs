//! Build unit value types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::platform::arch::Arch;

/// An interpreter version such as `3.8` or `3.10.4`.
///
/// Ordering is numeric, so `3.10` sorts after `3.9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PythonVersion {
  pub major: u32,
  pub minor: u32,
  pub patch: Option<u32>,
}

impl PythonVersion {
  pub fn new(major: u32, minor: u32) -> Self {
    Self {
      major,
      minor,
      patch: None,
    }
  }

  /// `major.minor` without the patch component, e.g. for `python3.8`.
  pub fn short(&self) -> String {
    format!("{}.{}", self.major, self.minor)
  }

  /// Wheel python tag, e.g. `cp38`.
  pub fn cp_tag(&self) -> String {
    format!("cp{}{}", self.major, self.minor)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid interpreter version '{0}' (expected MAJOR.MINOR[.PATCH])")]
pub struct ParseVersionError(pub String);

impl FromStr for PythonVersion {
  type Err = ParseVersionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let err = || ParseVersionError(s.to_string());
    let parts: Vec<&str> = s.trim().split('.').collect();
    if !(2..=3).contains(&parts.len()) {
      return Err(err());
    }
    let num = |p: &str| p.parse::<u32>().map_err(|_| err());
    Ok(Self {
      major: num(parts[0])?,
      minor: num(parts[1])?,
      patch: parts.get(2).map(|p| num(p)).transpose()?,
    })
  }
}

impl fmt::Display for PythonVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.patch {
      Some(patch) => write!(f, "{}.{}.{}", self.major, self.minor, patch),
      None => write!(f, "{}.{}", self.major, self.minor),
    }
  }
}

impl Serialize for PythonVersion {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for PythonVersion {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    // YAML hands unquoted `3.8` over as a float. Unquoted `3.10` reads as
    // 3.1, so configs should quote two-digit minors.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
      Str(String),
      Num(f64),
    }
    let text = match Raw::deserialize(deserializer)? {
      Raw::Str(s) => s,
      Raw::Num(n) => n.to_string(),
    };
    text.parse().map_err(serde::de::Error::custom)
  }
}

/// Kind of distribution a unit produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildKind {
  /// Binary distribution, specific to interpreter, platform and word size.
  Wheel,
  /// Source distribution.
  Sdist,
}

impl BuildKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Wheel => "wheel",
      Self::Sdist => "sdist",
    }
  }

  /// Whether `file_name` looks like a distribution of this kind.
  pub fn matches_file(&self, file_name: &str) -> bool {
    match self {
      Self::Wheel => file_name.ends_with(".whl"),
      Self::Sdist => file_name.ends_with(".tar.gz") || file_name.ends_with(".zip"),
    }
  }
}

impl fmt::Display for BuildKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Identity of a build unit: `(interpreter_version, architecture, build_kind)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId {
  pub interpreter_version: PythonVersion,
  pub architecture: Arch,
  pub build_kind: BuildKind,
}

impl UnitId {
  /// Filesystem- and environment-name-safe rendering, e.g. `py3.8-x86-wheel`.
  pub fn slug(&self) -> String {
    self.to_string()
  }
}

impl fmt::Display for UnitId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "py{}-{}-{}",
      self.interpreter_version, self.architecture, self.build_kind
    )
  }
}

/// Per-unit configuration derived from the unit itself rather than from
/// ambient environment toggles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildFlags {
  /// Provision a 32-bit interpreter and build for a 32-bit target.
  pub force_32bit: bool,
}

/// One point in the build matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildUnit {
  pub interpreter_version: PythonVersion,
  pub architecture: Arch,
  pub build_kind: BuildKind,
  /// CMake generator handed to the toolchain; empty means toolchain default.
  pub toolchain_generator: String,
  /// Whether the unit counts towards the pipeline's overall status.
  pub required: bool,
}

impl BuildUnit {
  pub fn id(&self) -> UnitId {
    UnitId {
      interpreter_version: self.interpreter_version,
      architecture: self.architecture,
      build_kind: self.build_kind,
    }
  }

  pub fn flags(&self) -> BuildFlags {
    BuildFlags {
      force_32bit: self.architecture.is_32bit(),
    }
  }
}
