use std::fmt;

/// Operating system variants the orchestrator runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
  Linux,
  MacOs,
  Windows,
}

impl Os {
  /// Detect the current operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::MacOs),
      "windows" => Some(Self::Windows),
      _ => None,
    }
  }

  /// Returns the lowercase string identifier for this OS
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "macos",
      Self::Windows => "windows",
    }
  }

  /// Directory holding executables inside a virtual environment.
  pub fn venv_bin_dir(&self) -> &'static str {
    match self {
      Self::Windows => "Scripts",
      Self::Linux | Self::MacOs => "bin",
    }
  }

  pub fn exe_suffix(&self) -> &'static str {
    match self {
      Self::Windows => ".exe",
      Self::Linux | Self::MacOs => "",
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
