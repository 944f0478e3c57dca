//! nbuild configuration.
//!
//! Loaded from an optional TOML file, then overridden by `NBUILD_*`
//! environment variables. Command-line flags are applied on top by the CLI.
//!
//! ```toml
//! cache_dir = "/var/cache/nbuild"
//! output_dir = "./packages"
//! repository = "stable"
//! target = "x86_64-linux-gnu"
//!
//! [[repositories]]
//! name = "stable"
//! url = "https://stable.example.org"
//! ```

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cache::CacheRoots;
use crate::consts::{CACHE_DIR_ENV, CONFIG_FILE_NAME, DEFAULT_REPOSITORY, OUTPUT_DIR_ENV, TARGET_ENV};
use crate::platform::host_target;
use crate::platform::paths::{cache_dir, config_dir};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}

/// A remote repository queried by the dependency linker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
  pub name: String,
  pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Root of the download, build, install and wrap caches.
  pub cache_dir: PathBuf,

  /// Where finished packages are written.
  pub output_dir: PathBuf,

  /// Repository the generated packages belong to.
  pub repository: String,

  /// GNU target triplet of the packages being built.
  pub target: String,

  /// Repositories searched, in order, when resolving dependencies remotely.
  pub repositories: Vec<RepositoryConfig>,

  /// Forward build tool output to the terminal instead of capturing it.
  #[serde(skip)]
  pub verbose: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      cache_dir: cache_dir(),
      output_dir: PathBuf::from("packages"),
      repository: DEFAULT_REPOSITORY.to_string(),
      target: host_target().unwrap_or_else(|| "x86_64-linux-gnu".to_string()),
      repositories: Vec::new(),
      verbose: false,
    }
  }
}

impl Config {
  /// Default location of the configuration file.
  pub fn default_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
  }

  /// Parse a configuration from TOML text. Missing keys take their defaults.
  pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
    toml::from_str(contents).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Load `path`, then apply environment overrides.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    debug!(path = %path.display(), "loaded config file");
    Ok(Self::parse(&contents, path)?.with_env_overrides())
  }

  /// Load `path` if given, else the default file if it exists, else defaults.
  pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
    if let Some(path) = path {
      return Self::load(path);
    }

    let default_path = Self::default_path();
    if default_path.exists() {
      Self::load(&default_path)
    } else {
      debug!(path = %default_path.display(), "no config file found, using defaults");
      Ok(Self::default().with_env_overrides())
    }
  }

  /// Apply `NBUILD_CACHE_DIR`, `NBUILD_OUTPUT_DIR` and `NBUILD_TARGET`.
  pub fn with_env_overrides(mut self) -> Self {
    if let Ok(path) = std::env::var(CACHE_DIR_ENV) {
      self.cache_dir = PathBuf::from(path);
    }
    if let Ok(path) = std::env::var(OUTPUT_DIR_ENV) {
      self.output_dir = PathBuf::from(path);
    }
    if let Ok(target) = std::env::var(TARGET_ENV) {
      self.target = target;
    }
    self
  }

  pub fn cache_roots(&self) -> CacheRoots {
    CacheRoots::new(&self.cache_dir, &self.output_dir)
  }
}
