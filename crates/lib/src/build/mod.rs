//! One manifest instantiated for one version.
//!
//! A [`Build`] owns the lifecycle of its caches and the working directory and
//! environment its commands run with. That context is a value carried by the
//! build, never the process's own cwd or environment: [`Build::scoped`] saves
//! it and restores it when a step is done.
//!
//! # Submodules
//!
//! - [`cmd`] - shell command execution inside a [`BuildEnv`]

pub mod cmd;
mod types;

pub use types::*;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;
use tracing::{debug, info, info_span};

use crate::check::check_executables;
use crate::config::Config;
use crate::graph::warn_cycles;
use crate::manifest::{BuildManifest, Metadata, VersionArgs};
use crate::package::Packages;
use crate::util::fs::recreate_dir;

use self::cmd::{CmdError, run_shell};

pub struct Build<'m> {
  manifest: &'m BuildManifest,
  config: &'m Config,
  identity: BuildIdentity,
  args: VersionArgs,
  download_cache: PathBuf,
  build_cache: PathBuf,
  install_cache: PathBuf,
  env: BuildEnv,
}

impl<'m> Build<'m> {
  /// Validate `args` and compute the cache paths. Nothing is created on disk.
  pub fn new(manifest: &'m BuildManifest, args: VersionArgs, config: &'m Config) -> Result<Self, BuildError> {
    if args.semver.trim().is_empty() {
      return Err(BuildError::MissingSemver);
    }
    let version = Version::parse(args.semver.trim()).map_err(|source| BuildError::InvalidVersion {
      version: args.semver.clone(),
      source,
    })?;

    let metadata = &manifest.metadata;
    let roots = config.cache_roots();
    let download_cache = roots.download_cache(&metadata.category, &metadata.name, &version);
    let build_cache = roots.build_cache(&metadata.category, &metadata.name, &version);
    let install_cache = roots.install_cache(&metadata.category, &metadata.name, &version);

    let mut vars = BTreeMap::new();
    vars.insert("TARGET".to_string(), config.target.clone());
    vars.insert("HOST".to_string(), config.target.clone());

    Ok(Self {
      manifest,
      config,
      identity: BuildIdentity {
        category: metadata.category.clone(),
        name: metadata.name.clone(),
        version,
      },
      args,
      download_cache,
      env: BuildEnv {
        cwd: build_cache.clone(),
        vars,
      },
      build_cache,
      install_cache,
    })
  }

  /// Wipe the build and install caches, make sure the download cache exists,
  /// then run the manifest's instructions from inside the build cache.
  pub fn build(&mut self) -> Result<Packages, BuildError> {
    let span = info_span!("build", build = %self.identity);
    let _guard = span.enter();
    info!("starting build");

    recreate_dir(&self.build_cache)?;
    recreate_dir(&self.install_cache)?;
    fs::create_dir_all(&self.download_cache)?;
    self.env.cwd = self.build_cache.clone();

    let manifest = self.manifest;
    let packages = (manifest.instructions())(self)?;

    info!(packages = packages.len(), "build complete");
    Ok(packages)
  }

  /// Build, check the resulting packages and wrap each of them.
  ///
  /// Executable-bit mismatches and dependency cycles are only reported.
  /// Returns the archive paths, ordered by package short name.
  pub fn build_and_wrap(&mut self) -> Result<Vec<PathBuf>, BuildError> {
    let packages = self.build()?;

    for package in packages.values() {
      check_executables(package);
    }
    warn_cycles(&packages);

    let mut archives = Vec::with_capacity(packages.len());
    for package in packages.into_values() {
      archives.push(package.wrap()?);
    }
    Ok(archives)
  }

  pub fn identity(&self) -> &BuildIdentity {
    &self.identity
  }

  pub fn name(&self) -> &str {
    &self.identity.name
  }

  pub fn category(&self) -> &str {
    &self.identity.category
  }

  pub fn version(&self) -> &Version {
    &self.identity.version
  }

  pub fn metadata(&self) -> &'m Metadata {
    &self.manifest.metadata
  }

  pub fn manifest(&self) -> &'m BuildManifest {
    self.manifest
  }

  pub fn config(&self) -> &'m Config {
    self.config
  }

  pub fn args(&self) -> &VersionArgs {
    &self.args
  }

  pub fn download_cache(&self) -> &Path {
    &self.download_cache
  }

  pub fn build_cache(&self) -> &Path {
    &self.build_cache
  }

  pub fn install_cache(&self) -> &Path {
    &self.install_cache
  }

  pub fn env(&self) -> &BuildEnv {
    &self.env
  }

  pub fn cwd(&self) -> &Path {
    &self.env.cwd
  }

  /// Change the working directory. Relative paths resolve against the current one.
  pub fn set_cwd(&mut self, path: impl AsRef<Path>) {
    let path = path.as_ref();
    self.env.cwd = if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.env.cwd.join(path)
    };
    debug!(cwd = %self.env.cwd.display(), "changed working directory");
  }

  pub fn set_var(&mut self, key: &str, value: impl Into<String>) {
    self.env.vars.insert(key.to_string(), value.into());
  }

  pub fn var(&self, key: &str) -> Option<&str> {
    self.env.vars.get(key).map(String::as_str)
  }

  /// Run `f` and restore the working directory and environment afterwards,
  /// whatever `f` changed and however it returned.
  pub fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
    let saved = self.env.clone();
    let result = f(self);
    self.env = saved;
    result
  }

  /// Run a shell command in the build's current environment.
  pub fn cmd(&self, cmd: &str) -> Result<(), CmdError> {
    run_shell(cmd, &self.env, self.config.verbose)
  }
}
