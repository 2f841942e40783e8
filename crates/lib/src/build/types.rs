use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::cmd::CmdError;
use crate::matrix::{BuildFlags, BuildKind, UnitId};
use crate::placeholder::PlaceholderError;
use crate::util::hash::{ContentHash, HashError};

/// Errors that can occur while building a unit's artifact.
#[derive(Debug, Error)]
pub enum BuildError {
  /// The toolchain exited unsuccessfully.
  #[error("toolchain exited with code {code:?}")]
  ToolchainExit { code: Option<i32>, log: String },

  /// The build environment lacks a module the build needs.
  #[error("missing build dependency '{module}'")]
  MissingDependency { module: String, log: String },

  /// The toolchain succeeded but left no artifact of the requested kind.
  #[error("no {kind} produced in {}", .dir.display())]
  NoArtifact { kind: BuildKind, dir: PathBuf },

  /// More than one artifact of the requested kind was produced.
  #[error("expected one {kind}, found {}", .paths.len())]
  AmbiguousArtifacts { kind: BuildKind, paths: Vec<PathBuf> },

  #[error("invalid build command: {0}")]
  Template(#[from] PlaceholderError),

  #[error("failed to hash artifact: {0}")]
  Hash(#[from] HashError),

  #[error(transparent)]
  Cmd(#[from] CmdError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl BuildError {
  /// Toolchain output attached to the error, if the toolchain ran.
  pub fn log(&self) -> Option<&str> {
    match self {
      Self::ToolchainExit { log, .. } | Self::MissingDependency { log, .. } => Some(log),
      _ => None,
    }
  }
}

/// A built, installable distribution file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
  pub path: PathBuf,
  pub unit: UnitId,
  pub kind: BuildKind,
  pub sha256: ContentHash,
  pub size: u64,
}

impl Artifact {
  pub fn file_name(&self) -> String {
    self
      .path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default()
  }
}

/// Everything a toolchain needs to know about the unit being built.
#[derive(Debug, Clone)]
pub struct BuildRequest {
  pub unit: UnitId,
  pub flags: BuildFlags,
  /// Shell-ready command for the build environment's interpreter.
  pub python: String,
  /// Variables of the build environment.
  pub env: BTreeMap<String, String>,
  /// Directory the toolchain must write distributions into.
  pub out_dir: PathBuf,
}

/// What a toolchain invocation produced.
#[derive(Debug, Clone, Default)]
pub struct ToolchainOutput {
  /// `None` when the process was killed.
  pub exit_code: Option<i32>,
  /// Distribution files of the requested kind found after the build.
  pub artifact_paths: Vec<PathBuf>,
  pub log: String,
}
