use crate::consts::{APP_NAME, ROOT_ENV_VAR};
use std::path::{Path, PathBuf};

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the directory for data files for the application
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join("AppData").join("Local"))
    .join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Root for everything a run creates outside the artifacts directory.
///
/// `WHEELHOUSE_ROOT` takes precedence over the platform data directory.
pub fn work_root() -> PathBuf {
  std::env::var(ROOT_ENV_VAR).map(PathBuf::from).unwrap_or_else(|_| data_dir())
}

/// Where venv-style environments are materialized.
pub fn envs_dir(root: &Path) -> PathBuf {
  root.join("envs")
}

/// Per-unit build output directories.
pub fn builds_dir(root: &Path) -> PathBuf {
  root.join("builds")
}
