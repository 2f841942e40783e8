//! Implementation of the `wheelhouse clean` command.
//!
//! Removes environment and build directories an interrupted run left under
//! the work root.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use wheelhouse_lib::config::{ManagerKind, PipelineConfig};
use wheelhouse_lib::platform::paths::{builds_dir, envs_dir};

use super::load_config;
use crate::output::{OutputFormat, format_bytes, print_info, print_json, print_stat, print_success, print_warning};

#[derive(Debug, Serialize)]
struct CleanResult {
  work_root: PathBuf,
  removed: Vec<PathBuf>,
  bytes_freed: u64,
  dry_run: bool,
}

pub fn cmd_clean(config_path: &Path, dry_run: bool, output: OutputFormat) -> Result<()> {
  // Cleaning works without a config; the default work root applies.
  let config = if config_path.exists() {
    load_config(config_path)?
  } else {
    PipelineConfig::default()
  };
  let work_root = config.work_root();

  let mut result = CleanResult {
    removed: Vec::new(),
    bytes_freed: 0,
    dry_run,
    work_root,
  };

  for dir in [envs_dir(&result.work_root), builds_dir(&result.work_root)] {
    if !dir.exists() {
      continue;
    }
    result.bytes_freed += dir_size(&dir);
    if !dry_run {
      debug!(dir = %dir.display(), "removing");
      std::fs::remove_dir_all(&dir).with_context(|| format!("Failed to remove {}", dir.display()))?;
    }
    result.removed.push(dir);
  }

  if output.is_json() {
    return print_json(&result);
  }

  if config.environment.manager == ManagerKind::Conda {
    print_warning("conda environments live outside the work root; remove them with `conda env remove`");
  }
  if result.removed.is_empty() {
    print_info(&format!("Nothing to clean under {}", result.work_root.display()));
    return Ok(());
  }

  if dry_run {
    print_info("Dry run - no changes made");
  } else {
    print_success("Clean complete!");
  }
  for dir in &result.removed {
    print_stat("Removed", &dir.display().to_string());
  }
  print_stat("Space freed", &format_bytes(result.bytes_freed));
  Ok(())
}

fn dir_size(path: &Path) -> u64 {
  let mut size = 0;
  if let Ok(entries) = std::fs::read_dir(path) {
    for entry in entries.flatten() {
      if entry.file_type().is_ok_and(|t| t.is_dir()) {
        size += dir_size(&entry.path());
      } else {
        size += entry.metadata().map(|m| m.len()).unwrap_or(0);
      }
    }
  }
  size
}
