//! The step pipeline every build goes through.
//!
//! A [`Template`] binds an optional [`Step`] to each of the nine pipeline
//! stages and runs them in order:
//!
//! ```text
//! fetch -> extract -> patch -> [build_folder]( configure -> compile -> check
//!       -> install(DESTDIR) -> split -> deplink )
//! ```
//!
//! Stages without a step are skipped. A failing step aborts the pipeline
//! unless it is `fail_ok`, which `check` is by default. Everything from
//! configure on runs inside `build_folder`, and the install step sees
//! `DESTDIR` pointing at the install cache. The working directory and
//! environment are restored once a scope ends.
//!
//! # Submodules
//!
//! - [`adapters`] - steps driving autotools, make, cmake, meson/ninja and cargo

pub mod adapters;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, info_span, warn};

use crate::build::{Build, BuildError};
use crate::consts::DESTDIR_VAR;
use crate::deplink::{DeplinkOptions, PackageIndex, elf_deplink, repository_clients};
use crate::fetch::{extract_all, fetch, patch_all};
use crate::package::Packages;
use crate::split::SplitKind;
use crate::util::fs::recreate_dir;

/// A step body. Receives the build with its working directory and environment set up.
pub type StepFn = Box<dyn FnMut(&mut Build<'_>) -> Result<(), BuildError>>;

/// Produces the packages of a build out of its install cache.
pub type Splitter = Box<dyn FnMut(&mut Build<'_>) -> Result<Packages, BuildError>>;

/// Adds runtime dependencies to the packages of a build.
pub type Linker = Box<dyn FnMut(&mut Build<'_>, &mut Packages) -> Result<(), BuildError>>;

/// The nine pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
  Fetch,
  Extract,
  Patch,
  Configure,
  Compile,
  Check,
  Install,
  Split,
  Deplink,
}

impl StepKind {
  pub const ALL: [StepKind; 9] = [
    Self::Fetch,
    Self::Extract,
    Self::Patch,
    Self::Configure,
    Self::Compile,
    Self::Check,
    Self::Install,
    Self::Split,
    Self::Deplink,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Fetch => "fetch",
      Self::Extract => "extract",
      Self::Patch => "patch",
      Self::Configure => "configure",
      Self::Compile => "compile",
      Self::Check => "check",
      Self::Install => "install",
      Self::Split => "split",
      Self::Deplink => "deplink",
    }
  }

  /// 1-based position in the pipeline.
  pub fn position(&self) -> usize {
    Self::ALL.iter().position(|kind| kind == self).map_or(0, |i| i + 1)
  }

  /// Whether a failure of this stage is tolerated when the step doesn't say otherwise.
  pub fn fail_ok_by_default(&self) -> bool {
    matches!(self, Self::Check)
  }
}

impl fmt::Display for StepKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// One pipeline step and its failure policy.
pub struct Step {
  run: StepFn,
  fail_ok: Option<bool>,
}

impl Step {
  pub fn new<F>(run: F) -> Self
  where
    F: FnMut(&mut Build<'_>) -> Result<(), BuildError> + 'static,
  {
    Self {
      run: Box::new(run),
      fail_ok: None,
    }
  }

  /// A step running `command` through the build's shell.
  pub fn cmd(command: impl Into<String>) -> Self {
    let command = command.into();
    Self::new(move |build| Ok(build.cmd(&command)?))
  }

  /// Tolerate (`true`) or refuse (`false`) failures, overriding the stage default.
  pub fn fail_ok(mut self, fail_ok: bool) -> Self {
    self.fail_ok = Some(fail_ok);
    self
  }

  /// Download or copy the version's `fetch` entries into the working directory.
  pub fn fetch() -> Self {
    Self::new(|build| {
      fetch(build)?;
      Ok(())
    })
  }

  /// Flat-extract every tarball of the working directory.
  pub fn extract() -> Self {
    Self::new(|build| {
      extract_all(build.cwd())?;
      Ok(())
    })
  }

  /// Apply every `*.patch` file of the working directory.
  pub fn patch() -> Self {
    Self::new(|build| {
      patch_all(build)?;
      Ok(())
    })
  }
}

impl fmt::Debug for Step {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Step").field("fail_ok", &self.fail_ok).finish_non_exhaustive()
  }
}

pub fn splitter<F>(split: F) -> Splitter
where
  F: FnMut(&mut Build<'_>) -> Result<Packages, BuildError> + 'static,
{
  Box::new(split)
}

pub fn linker<F>(link: F) -> Linker
where
  F: FnMut(&mut Build<'_>, &mut Packages) -> Result<(), BuildError> + 'static,
{
  Box::new(link)
}

/// A splitter step running `kind`.
pub fn split_step(kind: SplitKind) -> Splitter {
  splitter(move |build| kind.split(build))
}

/// A dependency-link step using the ELF linker and the configured repositories.
pub fn deplink_step(options: DeplinkOptions) -> Linker {
  linker(move |build, packages| {
    let clients = if options.remote_resolving {
      repository_clients(build.config())
    } else {
      Vec::new()
    };
    let indexes: Vec<&dyn PackageIndex> = clients.iter().map(|c| c as &dyn PackageIndex).collect();
    let report = elf_deplink(packages, &options, &indexes)?;
    info!(
      resolved = report.resolved.len(),
      unresolved = report.unresolved.len(),
      "dependency linking done"
    );
    Ok(())
  })
}

/// What to do with the install cache between two [`Variant`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallPolicy {
  /// Every variant installs on top of the previous ones.
  #[default]
  Cumulative,
  /// The install cache is emptied before each variant.
  Fresh,
}

/// One compilation configuration of [`Template::build_all`].
#[derive(Debug, Default)]
pub struct Variant {
  /// Overrides the template's build folder for this variant.
  pub build_folder: Option<PathBuf>,
  pub clean_before: Option<Step>,
  pub configure: Option<Step>,
  pub compile: Option<Step>,
  pub check: Option<Step>,
  pub install: Option<Step>,
  pub clean_after: Option<Step>,
}

pub struct Template {
  build_folder: PathBuf,
  fetch: Option<Step>,
  extract: Option<Step>,
  patch: Option<Step>,
  configure: Option<Step>,
  compile: Option<Step>,
  check: Option<Step>,
  install: Option<Step>,
  split: Option<Splitter>,
  deplink: Option<Linker>,
}

impl Default for Template {
  /// Fetch, extract and patch, no build system, `system` split and ELF linking.
  fn default() -> Self {
    Self {
      build_folder: PathBuf::from("."),
      fetch: Some(Step::fetch()),
      extract: Some(Step::extract()),
      patch: Some(Step::patch()),
      configure: None,
      compile: None,
      check: None,
      install: None,
      split: Some(split_step(SplitKind::System)),
      deplink: Some(deplink_step(DeplinkOptions::default())),
    }
  }
}

impl Template {
  /// A template where every stage is skipped.
  pub fn empty() -> Self {
    Self {
      build_folder: PathBuf::from("."),
      fetch: None,
      extract: None,
      patch: None,
      configure: None,
      compile: None,
      check: None,
      install: None,
      split: None,
      deplink: None,
    }
  }

  /// Directory, relative to the build cache, configure to deplink run in.
  pub fn with_build_folder(mut self, folder: impl Into<PathBuf>) -> Self {
    self.build_folder = folder.into();
    self
  }

  pub fn build_folder(&self) -> &PathBuf {
    &self.build_folder
  }

  pub fn with_fetch(mut self, step: Option<Step>) -> Self {
    self.fetch = step;
    self
  }

  pub fn with_extract(mut self, step: Option<Step>) -> Self {
    self.extract = step;
    self
  }

  pub fn with_patch(mut self, step: Option<Step>) -> Self {
    self.patch = step;
    self
  }

  pub fn with_configure(mut self, step: Option<Step>) -> Self {
    self.configure = step;
    self
  }

  pub fn with_compile(mut self, step: Option<Step>) -> Self {
    self.compile = step;
    self
  }

  pub fn with_check(mut self, step: Option<Step>) -> Self {
    self.check = step;
    self
  }

  pub fn with_install(mut self, step: Option<Step>) -> Self {
    self.install = step;
    self
  }

  pub fn with_split(mut self, split: Option<Splitter>) -> Self {
    self.split = split;
    self
  }

  pub fn with_deplink(mut self, deplink: Option<Linker>) -> Self {
    self.deplink = deplink;
    self
  }

  /// Run the nine stages and return the packages produced by the split stage.
  ///
  /// Without a split step the result is empty.
  pub fn run(&mut self, build: &mut Build<'_>) -> Result<Packages, BuildError> {
    self.prepare_sources(build)?;

    let folder = self.build_folder.clone();
    in_build_folder(build, &folder, |build| {
      run_step(build, StepKind::Configure, self.configure.as_mut())?;
      run_step(build, StepKind::Compile, self.compile.as_mut())?;
      run_step(build, StepKind::Check, self.check.as_mut())?;
      run_install(build, self.install.as_mut())?;
      self.split_and_link(build)
    })
  }

  /// Run the configure to install stages once per variant, between a shared
  /// fetch/extract/patch and a shared split/deplink.
  ///
  /// The template's own configure to install steps are not used.
  pub fn build_all(
    &mut self,
    build: &mut Build<'_>,
    variants: Vec<Variant>,
    policy: InstallPolicy,
  ) -> Result<Packages, BuildError> {
    self.prepare_sources(build)?;

    let count = variants.len();
    for (index, mut variant) in variants.into_iter().enumerate() {
      let span = info_span!("variant", variant = index + 1, of = count);
      let _guard = span.enter();

      if policy == InstallPolicy::Fresh {
        recreate_dir(build.install_cache())?;
      }

      let folder = variant.build_folder.clone().unwrap_or_else(|| self.build_folder.clone());
      in_build_folder(build, &folder, |build| {
        run_hook(build, "clean_before", variant.clean_before.as_mut())?;
        run_step(build, StepKind::Configure, variant.configure.as_mut())?;
        run_step(build, StepKind::Compile, variant.compile.as_mut())?;
        run_step(build, StepKind::Check, variant.check.as_mut())?;
        run_install(build, variant.install.as_mut())?;
        run_hook(build, "clean_after", variant.clean_after.as_mut())
      })?;
    }

    let folder = self.build_folder.clone();
    in_build_folder(build, &folder, |build| self.split_and_link(build))
  }

  fn prepare_sources(&mut self, build: &mut Build<'_>) -> Result<(), BuildError> {
    run_step(build, StepKind::Fetch, self.fetch.as_mut())?;
    run_step(build, StepKind::Extract, self.extract.as_mut())?;
    run_step(build, StepKind::Patch, self.patch.as_mut())
  }

  fn split_and_link(&mut self, build: &mut Build<'_>) -> Result<Packages, BuildError> {
    let mut packages = match self.split.as_mut() {
      Some(split) => {
        let span = info_span!("step", step = %StepKind::Split);
        let _guard = span.enter();
        log_position(StepKind::Split);
        let packages = split(build).map_err(|e| step_error(StepKind::Split, e))?;
        for package in packages.values() {
          info!(package = %package.id(), "generated package");
        }
        packages
      }
      None => {
        log_skipped(StepKind::Split);
        Packages::new()
      }
    };

    match self.deplink.as_mut() {
      Some(deplink) => {
        let span = info_span!("step", step = %StepKind::Deplink);
        let _guard = span.enter();
        log_position(StepKind::Deplink);
        deplink(build, &mut packages).map_err(|e| step_error(StepKind::Deplink, e))?;
      }
      None => log_skipped(StepKind::Deplink),
    }

    Ok(packages)
  }
}

impl fmt::Debug for Template {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Template")
      .field("build_folder", &self.build_folder)
      .field("fetch", &self.fetch)
      .field("extract", &self.extract)
      .field("patch", &self.patch)
      .field("configure", &self.configure)
      .field("compile", &self.compile)
      .field("check", &self.check)
      .field("install", &self.install)
      .field("split", &self.split.is_some())
      .field("deplink", &self.deplink.is_some())
      .finish()
  }
}

/// Run `f` with the working directory moved into `folder`, created if absent.
fn in_build_folder<T>(
  build: &mut Build<'_>,
  folder: &Path,
  f: impl FnOnce(&mut Build<'_>) -> Result<T, BuildError>,
) -> Result<T, BuildError> {
  build.scoped(|build| {
    build.set_cwd(folder);
    fs::create_dir_all(build.cwd())?;
    f(build)
  })
}

fn run_step(build: &mut Build<'_>, kind: StepKind, step: Option<&mut Step>) -> Result<(), BuildError> {
  let Some(step) = step else {
    log_skipped(kind);
    return Ok(());
  };

  let span = info_span!("step", step = %kind);
  let _guard = span.enter();
  log_position(kind);

  match (step.run)(build) {
    Ok(()) => Ok(()),
    Err(e) if step.fail_ok.unwrap_or(kind.fail_ok_by_default()) => {
      warn!(error = %e, "step failed, continuing");
      Ok(())
    }
    Err(e) => Err(step_error(kind, e)),
  }
}

fn run_install(build: &mut Build<'_>, step: Option<&mut Step>) -> Result<(), BuildError> {
  build.scoped(|build| {
    let destdir = build.install_cache().to_string_lossy().into_owned();
    build.set_var(DESTDIR_VAR, destdir);
    run_step(build, StepKind::Install, step)
  })
}

fn run_hook(build: &mut Build<'_>, name: &str, step: Option<&mut Step>) -> Result<(), BuildError> {
  let Some(step) = step else {
    return Ok(());
  };
  info!(hook = name, "running hook");
  match (step.run)(build) {
    Ok(()) => Ok(()),
    Err(e) if step.fail_ok.unwrap_or(false) => {
      warn!(hook = name, error = %e, "hook failed, continuing");
      Ok(())
    }
    Err(e) => Err(BuildError::Step {
      step: name.to_string(),
      source: Box::new(e),
    }),
  }
}

fn step_error(kind: StepKind, source: BuildError) -> BuildError {
  BuildError::Step {
    step: kind.to_string(),
    source: Box::new(source),
  }
}

fn log_position(kind: StepKind) {
  info!("step {}/{}: {}", kind.position(), StepKind::ALL.len(), kind);
}

fn log_skipped(kind: StepKind) {
  info!("step {}/{}: {} (skipped)", kind.position(), StepKind::ALL.len(), kind);
}
