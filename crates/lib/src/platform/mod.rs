pub mod arch;
pub mod os;
pub mod paths;

use arch::Arch;
use os::Os;
use std::fmt;

/// A build target: host OS paired with the unit's word size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
}

impl Platform {
  pub fn new(arch: Arch, os: Os) -> Self {
    Self { arch, os }
  }

  /// Target for `arch` on the running host.
  ///
  /// Returns `None` if the host OS is not supported
  pub fn host(arch: Arch) -> Option<Self> {
    Some(Self { arch, os: Os::current()? })
  }

  /// Platform tag a binary wheel for this target carries (e.g. `win_amd64`).
  pub fn wheel_tag(&self) -> &'static str {
    match (self.os, self.arch) {
      (Os::Windows, Arch::X64) => "win_amd64",
      (Os::Windows, Arch::X86) => "win32",
      (Os::Linux, Arch::X64) => "x86_64",
      (Os::Linux, Arch::X86) => "i686",
      (Os::MacOs, Arch::X64) => "x86_64",
      (Os::MacOs, Arch::X86) => "i386",
    }
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.os, self.arch)
  }
}
