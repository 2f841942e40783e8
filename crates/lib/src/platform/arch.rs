use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target word size of a build unit.
///
/// `X86` is the 32-bit variant. Selecting it threads a 32-bit flag through
/// both environment provisioning and the toolchain invocation.
///
/// Config files may use the usual aliases (`amd64`, `Win32`, `i686`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Arch {
  X64,
  X86,
}

impl Arch {
  /// Returns the lowercase string identifier for this architecture
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X64 => "x64",
      Self::X86 => "x86",
    }
  }

  pub fn is_32bit(&self) -> bool {
    matches!(self, Self::X86)
  }

  /// Value passed to a CMake generator as `-A <platform>`.
  pub fn generator_platform(&self) -> &'static str {
    match self {
      Self::X64 => "x64",
      Self::X86 => "Win32",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown architecture '{0}' (expected x64 or x86)")]
pub struct ParseArchError(pub String);

impl FromStr for Arch {
  type Err = ParseArchError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "x64" | "x86_64" | "amd64" => Ok(Self::X64),
      "x86" | "i686" | "win32" => Ok(Self::X86),
      _ => Err(ParseArchError(s.to_string())),
    }
  }
}

impl TryFrom<String> for Arch {
  type Error = ParseArchError;

  fn try_from(s: String) -> Result<Self, Self::Error> {
    s.parse()
  }
}
