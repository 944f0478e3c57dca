//! Packages: the outputs of a build.
//!
//! A [`Package`] owns a staging tree (its `wrap_cache`) that is filled by
//! draining the build's install cache, then wrapped once into a
//! `<name>-<version>.nest` archive in its `package_cache`.
//!
//! Content manipulation lives in `ops`, archiving in `wrap`.

mod ops;
mod wrap;

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use semver::Version;
use thiserror::Error;
use tracing::debug;

use crate::build::Build;
use crate::manifest::{Kind, License};
use crate::pattern::PatternError;
use crate::util::fs::{contains_files, recreate_dir};

/// Packages produced by a build, keyed by short name (`category/name`).
pub type Packages = BTreeMap<String, Package>;

#[derive(Debug, Error)]
pub enum PackageError {
  #[error("{op} expects a path relative to the staging tree, got absolute path {path}")]
  AbsolutePath { op: &'static str, path: PathBuf },

  #[error("invalid description for {package}: {description:?} (must start with an uppercase letter and end with a period)")]
  InvalidDescription { package: String, description: String },

  #[error("invalid package requirement {0:?}")]
  InvalidRequirement(String),

  #[error(transparent)]
  Pattern(#[from] PatternError),

  #[error("failed to serialize package manifest: {0}")]
  Serialize(#[from] toml::ser::Error),

  #[error("I/O error: {0}")]
  Io(#[from] io::Error),
}

/// Repository, category, name and version of a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId {
  pub repository: String,
  pub category: String,
  pub name: String,
  pub version: Version,
}

impl PackageId {
  /// A package of the build's category, version and configured repository.
  pub fn new(build: &Build<'_>, name: &str) -> Self {
    Self {
      repository: build.config().repository.clone(),
      category: build.category().to_string(),
      name: name.to_string(),
      version: build.version().clone(),
    }
  }

  pub fn with_category(mut self, category: &str) -> Self {
    self.category = category.to_string();
    self
  }

  /// `repository::category/name`
  pub fn full_name(&self) -> String {
    format!("{}::{}/{}", self.repository, self.category, self.name)
  }

  /// `category/name`
  pub fn short_name(&self) -> String {
    format!("{}/{}", self.category, self.name)
  }
}

impl fmt::Display for PackageId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}#{}", self.category, self.name, self.version)
  }
}

pub struct Package {
  id: PackageId,
  description: String,
  pub tags: Vec<String>,
  pub maintainer: String,
  pub licenses: Vec<License>,
  pub upstream_url: String,
  pub kind: Kind,
  /// Full name of each runtime dependency mapped to its version requirement.
  run_dependencies: BTreeMap<String, String>,
  wrap_cache: PathBuf,
  package_cache: PathBuf,
  install_cache: PathBuf,
  build_cache: PathBuf,
  source_dir: PathBuf,
  instructions: Option<String>,
  recursive_globs: bool,
}

impl Package {
  /// A package named `name` in the build's category, described by the manifest's metadata.
  pub fn new(build: &Build<'_>, name: &str) -> Result<Self, PackageError> {
    Self::create(build, PackageId::new(build, name), None)
  }

  /// Create a package, wiping its staging tree.
  ///
  /// Metadata defaults to the manifest's; `description` overrides its description.
  pub fn create(build: &Build<'_>, id: PackageId, description: Option<&str>) -> Result<Self, PackageError> {
    let metadata = build.metadata();
    let description = normalize_description(&id, description.unwrap_or(&metadata.description))?;

    let roots = build.config().cache_roots();
    let wrap_cache = roots.wrap_cache(&id.repository, &id.category, &id.name, &id.version);
    let package_cache = roots.package_cache(&id.repository, &id.category, &id.name, &id.version);

    recreate_dir(&wrap_cache)?;
    debug!(package = %id, wrap_cache = %wrap_cache.display(), "created package");

    Ok(Self {
      description,
      tags: metadata.tags.clone(),
      maintainer: metadata.maintainer.clone(),
      licenses: metadata.licenses.clone(),
      upstream_url: metadata.upstream_url.clone(),
      kind: metadata.kind,
      run_dependencies: BTreeMap::new(),
      wrap_cache,
      package_cache,
      install_cache: build.install_cache().to_path_buf(),
      build_cache: build.build_cache().to_path_buf(),
      source_dir: build.manifest().source_dir.clone(),
      instructions: None,
      recursive_globs: true,
      id,
    })
  }

  pub fn id(&self) -> &PackageId {
    &self.id
  }

  pub fn description(&self) -> &str {
    &self.description
  }

  pub fn set_description(&mut self, description: &str) -> Result<(), PackageError> {
    self.description = normalize_description(&self.id, description)?;
    Ok(())
  }

  pub fn wrap_cache(&self) -> &Path {
    &self.wrap_cache
  }

  pub fn package_cache(&self) -> &Path {
    &self.package_cache
  }

  /// Path of the archive [`Package::wrap`] produces.
  pub fn archive_path(&self) -> PathBuf {
    self.package_cache.join(format!(
      "{}-{}.{}",
      self.id.name,
      self.id.version,
      crate::consts::ARCHIVE_EXT
    ))
  }

  /// True when the staging tree holds no file, only (possibly) empty directories.
  pub fn is_empty(&self) -> bool {
    !contains_files(&self.wrap_cache)
  }

  /// Whether `**` crosses directories in the patterns given to this package. On by default.
  pub fn set_recursive_globs(&mut self, recursive: bool) {
    self.recursive_globs = recursive;
  }

  pub fn dependencies(&self) -> &BTreeMap<String, String> {
    &self.run_dependencies
  }

  /// Depend on `other`, by default on its exact version.
  pub fn depends_on(&mut self, other: &Package, version_req: Option<&str>) {
    let req = version_req
      .map(str::to_string)
      .unwrap_or_else(|| format!("={}", other.id.version));
    self.add_dependency(&other.id.full_name(), &req);
  }

  /// Add a requirement written `name#req`.
  ///
  /// Without `#` any version is accepted. Without a `repository::` prefix the
  /// package's own repository is assumed.
  pub fn requires(&mut self, requirement: &str) -> Result<(), PackageError> {
    let (name, req) = match requirement.split_once('#') {
      Some((name, req)) => (name.trim(), req.trim()),
      None => (requirement.trim(), "*"),
    };
    if name.is_empty() || req.is_empty() || !name.contains('/') {
      return Err(PackageError::InvalidRequirement(requirement.to_string()));
    }

    let full_name = if name.contains("::") {
      name.to_string()
    } else {
      format!("{}::{}", self.id.repository, name)
    };
    self.add_dependency(&full_name, req);
    Ok(())
  }

  /// Record a dependency unless one on `full_name` already exists.
  pub fn add_dependency(&mut self, full_name: &str, version_req: &str) {
    self
      .run_dependencies
      .entry(full_name.to_string())
      .or_insert_with(|| version_req.to_string());
  }

  pub fn instructions(&self) -> Option<&str> {
    self.instructions.as_deref()
  }

  /// Shell script shipped as `instructions.sh` in the archive.
  pub fn set_instructions(&mut self, instructions: impl Into<String>) {
    self.instructions = Some(instructions.into());
  }

  /// Read the install instructions from a file relative to the manifest's directory.
  pub fn load_instructions(&mut self, path: impl AsRef<Path>) -> Result<(), PackageError> {
    let path = path.as_ref();
    if path.is_absolute() {
      return Err(PackageError::AbsolutePath {
        op: "load_instructions",
        path: path.to_path_buf(),
      });
    }
    let contents = std::fs::read_to_string(self.source_dir.join(path))?;
    self.set_instructions(contents);
    Ok(())
  }
}

impl fmt::Display for Package {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.id.fmt(f)
  }
}

impl fmt::Debug for Package {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Package")
      .field("id", &self.id)
      .field("kind", &self.kind)
      .field("run_dependencies", &self.run_dependencies)
      .field("wrap_cache", &self.wrap_cache)
      .finish_non_exhaustive()
  }
}

fn normalize_description(id: &PackageId, description: &str) -> Result<String, PackageError> {
  let description = description.replace('\n', " ").trim().to_string();
  let starts_upper = description.chars().next().is_some_and(char::is_uppercase);
  if !starts_upper || !description.ends_with('.') {
    return Err(PackageError::InvalidDescription {
      package: id.short_name(),
      description,
    });
  }
  Ok(description)
}
