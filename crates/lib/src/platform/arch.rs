use std::fmt;

/// CPU architectures zbuild can resolve packages for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  Amd64,
  Arm64,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::Amd64),
      "aarch64" => Some(Self::Arm64),
      _ => None,
    }
  }

  /// Parses a Debian architecture name.
  pub fn from_dpkg(name: &str) -> Option<Self> {
    match name {
      "amd64" => Some(Self::Amd64),
      "arm64" => Some(Self::Arm64),
      _ => None,
    }
  }

  /// Returns the architecture name used by Debian repositories
  pub fn dpkg_name(&self) -> &'static str {
    match self {
      Self::Amd64 => "amd64",
      Self::Arm64 => "arm64",
    }
  }
}

impl Default for Arch {
  fn default() -> Self {
    Self::current().unwrap_or(Self::Amd64)
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.dpkg_name())
  }
}
