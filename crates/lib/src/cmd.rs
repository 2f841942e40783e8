//! Child process execution.
//!
//! Every collaborator that shells out (environment managers, the toolchain,
//! the verification program, twine) goes through [`run`] so that output
//! capture, timeouts and reproducibility variables behave the same way.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::consts::SOURCE_DATE_EPOCH;

/// A command to run through the platform shell.
#[derive(Debug, Clone, Default)]
pub struct CmdSpec {
  /// The script passed to the shell.
  pub script: String,
  /// Extra environment variables, merged over the inherited environment.
  pub env: BTreeMap<String, String>,
  /// Working directory; inherits the current one when `None`.
  pub cwd: Option<PathBuf>,
  /// Kill the process and report a timeout after this long.
  pub timeout: Option<Duration>,
}

impl CmdSpec {
  pub fn new(script: impl Into<String>) -> Self {
    Self {
      script: script.into(),
      ..Default::default()
    }
  }

  pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  pub fn with_cwd(mut self, cwd: &Path) -> Self {
    self.cwd = Some(cwd.to_path_buf());
    self
  }

  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }
}

/// Captured result of a finished (or timed out) process.
#[derive(Debug, Clone, Default)]
pub struct CmdOutput {
  /// Exit code, `None` when killed by a signal or timeout.
  pub code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
  pub timed_out: bool,
}

impl CmdOutput {
  pub fn success(&self) -> bool {
    !self.timed_out && self.code == Some(0)
  }

  /// Stdout followed by stderr, for logs.
  pub fn combined(&self) -> String {
    let mut log = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
    log.push_str(&self.stdout);
    if !self.stdout.is_empty() && !self.stdout.ends_with('\n') && !self.stderr.is_empty() {
      log.push('\n');
    }
    log.push_str(&self.stderr);
    log
  }
}

/// Errors that prevent a command from producing an exit status at all.
#[derive(Debug, Error)]
pub enum CmdError {
  #[error("failed to spawn '{shell}': {source}")]
  Spawn {
    shell: String,
    #[source]
    source: std::io::Error,
  },
}

/// Run a command through the platform shell and capture its output.
///
/// A non-zero exit is not an error here: callers decide what failure means.
/// `SOURCE_DATE_EPOCH` is always exported so archive timestamps are
/// reproducible. The child is killed if the returned future is dropped.
pub async fn run(spec: &CmdSpec) -> Result<CmdOutput, CmdError> {
  info!(cmd = %spec.script, "executing command");

  let (shell_cmd, shell_args) = shell();

  let mut command = Command::new(shell_cmd);
  command
    .args(shell_args)
    .arg(&spec.script)
    .env("SOURCE_DATE_EPOCH", SOURCE_DATE_EPOCH)
    .kill_on_drop(true);

  if let Some(cwd) = &spec.cwd {
    command.current_dir(cwd);
  }
  for (key, value) in &spec.env {
    command.env(key, value);
  }

  debug!(shell = %shell_cmd, cwd = ?spec.cwd, "spawning process");

  let output = command.output();
  let output = match spec.timeout {
    Some(limit) => match tokio::time::timeout(limit, output).await {
      Ok(result) => result,
      Err(_) => {
        debug!(cmd = %spec.script, ?limit, "command timed out");
        return Ok(CmdOutput {
          code: None,
          stdout: String::new(),
          stderr: format!("timed out after {:?}", limit),
          timed_out: true,
        });
      }
    },
    None => output.await,
  }
  .map_err(|source| CmdError::Spawn {
    shell: shell_cmd.to_string(),
    source,
  })?;

  let result = CmdOutput {
    code: output.status.code(),
    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    timed_out: false,
  };

  if !result.success() {
    if !result.stderr.is_empty() {
      debug!(stderr = %result.stderr, "command stderr");
    }
    if !result.stdout.is_empty() {
      debug!(stdout = %result.stdout, "command stdout");
    }
  }

  Ok(result)
}

/// Quote a single argument for the platform shell.
pub fn quote(arg: &str) -> String {
  if !arg.is_empty()
    && arg
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '+' | '\\'))
  {
    return arg.to_string();
  }

  #[cfg(unix)]
  {
    format!("'{}'", arg.replace('\'', "'\\''"))
  }

  #[cfg(windows)]
  {
    format!("'{}'", arg.replace('\'', "''"))
  }
}

/// Shell and leading arguments for the current platform.
///
/// `/bin/sh` on Unix and PowerShell on Windows; the user's `$SHELL` is
/// ignored because interactive shells may source profiles that change the
/// environment.
fn shell() -> (&'static str, &'static [&'static str]) {
  #[cfg(unix)]
  {
    ("/bin/sh", &["-c"])
  }

  #[cfg(windows)]
  {
    ("powershell.exe", &["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command"])
  }
}
