use std::path::{Path, PathBuf};

use semver::Version;

/// Roots of every cache an nbuild run touches.
///
/// All paths are pure functions of the roots and the identity passed in; no
/// directory is created here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRoots {
  /// Holds `download/`, `build/`, `install/` and `wrap/`.
  pub cache: PathBuf,
  /// Receives the final `.nest` archives.
  pub output: PathBuf,
}

impl CacheRoots {
  pub fn new(cache: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
    Self {
      cache: cache.into(),
      output: output.into(),
    }
  }

  /// Downloaded sources, kept across builds.
  pub fn download_cache(&self, category: &str, name: &str, version: &Version) -> PathBuf {
    build_scoped(&self.cache, "download", category, name, version)
  }

  /// Working directory of a build: fetched files, extracted sources, objects.
  pub fn build_cache(&self, category: &str, name: &str, version: &Version) -> PathBuf {
    build_scoped(&self.cache, "build", category, name, version)
  }

  /// Staged-install tree (`DESTDIR`) of a build.
  pub fn install_cache(&self, category: &str, name: &str, version: &Version) -> PathBuf {
    build_scoped(&self.cache, "install", category, name, version)
  }

  /// Staging tree of one package before it is wrapped.
  pub fn wrap_cache(&self, repository: &str, category: &str, name: &str, version: &Version) -> PathBuf {
    self
      .cache
      .join("wrap")
      .join(repository)
      .join(category)
      .join(name)
      .join(version.to_string())
  }

  /// Directory receiving the package archive.
  pub fn package_cache(&self, repository: &str, category: &str, name: &str, version: &Version) -> PathBuf {
    self
      .output
      .join(repository)
      .join(category)
      .join(name)
      .join(version.to_string())
  }
}

fn build_scoped(root: &Path, kind: &str, category: &str, name: &str, version: &Version) -> PathBuf {
  root.join(kind).join(category).join(name).join(version.to_string())
}
