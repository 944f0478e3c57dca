use std::fmt;

/// CPU architectures nbuild knows a target triplet for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86_64,
  I686,
  Aarch64,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::X86_64),
      "x86" => Some(Self::I686),
      "aarch64" => Some(Self::Aarch64),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::I686 => "i686",
      Self::Aarch64 => "aarch64",
    }
  }

  /// GNU triplet used by autotools `--build`/`--host` and by multi-arch paths
  pub fn target_triple(&self) -> String {
    format!("{}-linux-gnu", self.as_str())
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
