//! Matrix specification and expansion into build units.
//!
//! A matrix is declared as cartesian axes, optionally pruned with `exclude`
//! patterns, plus explicitly enumerated `include` combinations:
//!
//! ```yaml
//! matrix:
//!   python: ["3.7", "3.8"]
//!   arch: [x64, x86]
//!   kind: [wheel]
//!   generator: "Visual Studio 15 2017"
//!   exclude:
//!     - { python: "3.7", arch: x86 }
//!   include:
//!     - { python: "3.8", arch: x64, kind: sdist, required: false }
//! ```
//!
//! Expansion happens once, up front, and yields one [`BuildUnit`] per
//! declared combination. Two combinations with the same identity are
//! rejected instead of being silently merged.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::types::{BuildKind, BuildUnit, PythonVersion, UnitId};
use crate::platform::arch::Arch;

/// Errors produced while expanding a matrix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatrixError {
  /// Neither axes nor include entries were declared.
  #[error("matrix declares no build combinations")]
  Empty,

  /// Some axes were declared but this one is missing or empty.
  #[error("matrix axis '{0}' is empty")]
  EmptyAxis(&'static str),

  /// Two declared combinations share an identity.
  #[error("duplicate build unit {0}")]
  DuplicateUnit(UnitId),
}

/// A partial combination used to prune the cartesian product.
///
/// Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExcludeEntry {
  #[serde(default)]
  pub python: Option<PythonVersion>,
  #[serde(default)]
  pub arch: Option<Arch>,
  #[serde(default)]
  pub kind: Option<BuildKind>,
}

impl ExcludeEntry {
  fn matches(&self, id: &UnitId) -> bool {
    self.python.is_none_or(|v| v == id.interpreter_version)
      && self.arch.is_none_or(|a| a == id.architecture)
      && self.kind.is_none_or(|k| k == id.build_kind)
  }
}

/// An explicitly enumerated combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncludeEntry {
  pub python: PythonVersion,
  pub arch: Arch,
  pub kind: BuildKind,
  /// Overrides the matrix-wide generator for this combination.
  #[serde(default)]
  pub generator: Option<String>,
  #[serde(default = "default_required")]
  pub required: bool,
}

fn default_required() -> bool {
  true
}

/// Declarative build matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatrixSpec {
  #[serde(default)]
  pub python: Vec<PythonVersion>,
  #[serde(default)]
  pub arch: Vec<Arch>,
  #[serde(default)]
  pub kind: Vec<BuildKind>,
  /// Generator for every cartesian combination and the default for includes.
  #[serde(default)]
  pub generator: String,
  #[serde(default)]
  pub exclude: Vec<ExcludeEntry>,
  #[serde(default)]
  pub include: Vec<IncludeEntry>,
}

impl MatrixSpec {
  /// A matrix made only of explicit combinations.
  pub fn enumerated(include: Vec<IncludeEntry>) -> Self {
    Self {
      include,
      ..Default::default()
    }
  }

  fn has_axes(&self) -> bool {
    !self.python.is_empty() || !self.arch.is_empty() || !self.kind.is_empty()
  }

  /// Expand into build units, cartesian combinations first (in declared
  /// axis order), then includes.
  pub fn expand(&self) -> Result<Vec<BuildUnit>, MatrixError> {
    if !self.has_axes() && self.include.is_empty() {
      return Err(MatrixError::Empty);
    }

    let mut units = Vec::new();

    if self.has_axes() {
      if self.python.is_empty() {
        return Err(MatrixError::EmptyAxis("python"));
      }
      if self.arch.is_empty() {
        return Err(MatrixError::EmptyAxis("arch"));
      }
      if self.kind.is_empty() {
        return Err(MatrixError::EmptyAxis("kind"));
      }

      let mut used_excludes = vec![false; self.exclude.len()];

      for &interpreter_version in &self.python {
        for &architecture in &self.arch {
          for &build_kind in &self.kind {
            let id = UnitId {
              interpreter_version,
              architecture,
              build_kind,
            };

            if let Some(idx) = self.exclude.iter().position(|e| e.matches(&id)) {
              debug!(unit = %id, "excluded from matrix");
              used_excludes[idx] = true;
              continue;
            }

            units.push(BuildUnit {
              interpreter_version,
              architecture,
              build_kind,
              toolchain_generator: self.generator.clone(),
              required: true,
            });
          }
        }
      }

      for (entry, used) in self.exclude.iter().zip(used_excludes) {
        if !used {
          warn!(exclude = ?entry, "matrix exclude entry matches nothing");
        }
      }
    }

    for entry in &self.include {
      units.push(BuildUnit {
        interpreter_version: entry.python,
        architecture: entry.arch,
        build_kind: entry.kind,
        toolchain_generator: entry.generator.clone().unwrap_or_else(|| self.generator.clone()),
        required: entry.required,
      });
    }

    let mut seen = HashSet::new();
    for unit in &units {
      if !seen.insert(unit.id()) {
        return Err(MatrixError::DuplicateUnit(unit.id()));
      }
    }

    Ok(units)
  }
}
