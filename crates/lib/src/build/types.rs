use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;

use semver::Version;
use thiserror::Error;

use crate::build::cmd::CmdError;
use crate::deplink::DeplinkError;
use crate::fetch::{ExtractError, FetchError};
use crate::package::PackageError;
use crate::pattern::PatternError;

/// Category, name and version of a build. Fixed once the build exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildIdentity {
  pub category: String,
  pub name: String,
  pub version: Version,
}

impl fmt::Display for BuildIdentity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}#{}", self.category, self.name, self.version)
  }
}

/// Working directory and environment overlay applied to every command a build runs.
///
/// The process environment is inherited; `vars` are set on top of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnv {
  pub cwd: PathBuf,
  pub vars: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum BuildError {
  /// The version entry has no `semver` value.
  #[error("build arguments have no `semver` value")]
  MissingSemver,

  /// `semver` is not `major.minor.patch`.
  #[error("invalid version {version:?}: {source}")]
  InvalidVersion {
    version: String,
    #[source]
    source: semver::Error,
  },

  /// A pipeline step failed and was not allowed to.
  #[error("{step} step failed: {source}")]
  Step {
    step: String,
    #[source]
    source: Box<BuildError>,
  },

  #[error(transparent)]
  Package(#[from] PackageError),

  #[error(transparent)]
  Pattern(#[from] PatternError),

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  Extract(#[from] ExtractError),

  #[error(transparent)]
  Cmd(#[from] CmdError),

  #[error(transparent)]
  Deplink(#[from] DeplinkError),

  #[error("I/O error: {0}")]
  Io(#[from] io::Error),

  /// Raised by manifest-provided instructions.
  #[error("{0}")]
  Custom(String),
}

impl BuildError {
  pub fn custom(message: impl Into<String>) -> Self {
    Self::Custom(message.into())
  }
}
