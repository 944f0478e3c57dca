//! ELF dependency linking.
//!
//! Finds the ELF files of a set of sibling packages, reads the libraries they
//! need and turns each one into a runtime dependency: on a sibling shipping
//! that library when there is one, otherwise on whatever package a configured
//! repository says ships it.
//!
//! Linking is best effort. Unresolved libraries are reported, never fatal.
//! Existing dependencies are never replaced, so linkers can be chained.
//!
//! # Submodules
//!
//! - [`elf`] - `DT_NEEDED` extraction
//! - [`remote`] - repository search

pub mod elf;
pub mod remote;

use std::collections::HashMap;
use std::fs;

use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::config::Config;
use crate::package::{PackageId, Packages};
use crate::pattern::{PatternError, glob_relative};

pub use remote::{PackageIndex, RepositoryClient, ResolutionError};

/// Where binaries are looked for, relative to each package's staging tree.
pub const DEFAULT_SEARCH_PATTERNS: &[&str] = &["{,usr/}{,s}bin/*", "{,usr/}lib{,32,64}/*"];

#[derive(Debug, Error)]
pub enum DeplinkError {
  #[error("two packages ship a binary named {file}: {first} and {second}")]
  DuplicateBinary {
    file: String,
    first: String,
    second: String,
  },

  #[error(transparent)]
  Pattern(#[from] PatternError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeplinkOptions {
  pub search_patterns: Vec<String>,
  /// Resolve against the sibling packages.
  pub local_resolving: bool,
  /// Resolve against the configured repositories.
  pub remote_resolving: bool,
}

impl Default for DeplinkOptions {
  fn default() -> Self {
    Self {
      search_patterns: DEFAULT_SEARCH_PATTERNS.iter().map(|p| p.to_string()).collect(),
      local_resolving: true,
      remote_resolving: true,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
  Local,
  Remote { repository: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
  /// Short name of the package the requirement was added to.
  pub package: String,
  pub library: String,
  /// Full name of the package providing `library`.
  pub provided_by: String,
  pub requirement: String,
  pub provider: Provider,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedDependency {
  pub package: String,
  pub library: String,
}

/// What a linker run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeplinkReport {
  pub resolved: Vec<ResolvedDependency>,
  pub unresolved: Vec<UnresolvedDependency>,
}

/// One search client per configured repository, in configuration order.
pub fn repository_clients(config: &Config) -> Vec<RepositoryClient> {
  config.repositories.iter().map(RepositoryClient::new).collect()
}

/// Link the runtime dependencies of `packages`.
///
/// Every package is scanned before any is modified, so a
/// [`DeplinkError::DuplicateBinary`] leaves all packages untouched.
pub fn elf_deplink(
  packages: &mut Packages,
  options: &DeplinkOptions,
  indexes: &[&dyn PackageIndex],
) -> Result<DeplinkReport, DeplinkError> {
  let span = info_span!("deplink");
  let _guard = span.enter();

  // Owner of each binary file name, and what each package needs.
  let mut binaries: HashMap<String, PackageId> = HashMap::new();
  let mut needs: Vec<(String, Vec<String>)> = Vec::new();

  for (short_name, package) in packages.iter() {
    info!(package = %package.id().full_name(), "looking for binaries");
    let mut needed: Vec<String> = Vec::new();

    for (file_name, libraries) in find_elfs(package.wrap_cache(), &options.search_patterns)? {
      match binaries.get(&file_name) {
        Some(owner) if owner != package.id() => {
          return Err(DeplinkError::DuplicateBinary {
            file: file_name,
            first: owner.to_string(),
            second: package.id().to_string(),
          });
        }
        Some(_) => {}
        None => {
          binaries.insert(file_name.clone(), package.id().clone());
        }
      }
      debug!(binary = %file_name, needed = %libraries.join(" "), "found binary");
      for library in libraries {
        if !needed.contains(&library) {
          needed.push(library);
        }
      }
    }

    needs.push((short_name.clone(), needed));
  }

  let mut report = DeplinkReport::default();

  for (short_name, needed) in needs {
    let Some(package) = packages.get_mut(&short_name) else {
      continue;
    };
    info!(package = %package.id().full_name(), "solving dependencies");

    for library in needed {
      if options.local_resolving
        && let Some(owner) = binaries.get(&library)
      {
        if owner == package.id() {
          debug!(library = %library, "provided by the package itself");
          continue;
        }
        let requirement = format!("={}", owner.version);
        package.add_dependency(&owner.full_name(), &requirement);
        info!(library = %library, provider = %owner.full_name(), requirement = %requirement, "found locally");
        report.resolved.push(ResolvedDependency {
          package: short_name.clone(),
          library,
          provided_by: owner.full_name(),
          requirement,
          provider: Provider::Local,
        });
        continue;
      }

      if options.remote_resolving
        && let Some((repository, provided_by)) = search_remote(indexes, &library)
      {
        package.add_dependency(&provided_by, "*");
        info!(library = %library, provider = %provided_by, repository = %repository, "found remotely");
        report.resolved.push(ResolvedDependency {
          package: short_name.clone(),
          library,
          provided_by,
          requirement: "*".to_string(),
          provider: Provider::Remote { repository },
        });
        continue;
      }

      warn!(
        package = %short_name,
        library = %library,
        "requirement could not be solved, manual dependency linking required"
      );
      report.unresolved.push(UnresolvedDependency {
        package: short_name.clone(),
        library,
      });
    }
  }

  Ok(report)
}

/// First repository, in order, with a single package shipping `library`.
fn search_remote(indexes: &[&dyn PackageIndex], library: &str) -> Option<(String, String)> {
  for index in indexes {
    match index.search_file(library) {
      Ok(Some(full_name)) => return Some((index.name().to_string(), full_name)),
      Ok(None) => debug!(repository = %index.name(), library, "no package contains this file"),
      Err(err) => warn!(repository = %index.name(), library, error = %err, "repository search failed, skipping"),
    }
  }
  None
}

/// File name and needed libraries of every ELF matching `patterns` below `root`.
fn find_elfs(root: &std::path::Path, patterns: &[String]) -> Result<Vec<(String, Vec<String>)>, DeplinkError> {
  let mut elfs = Vec::new();
  for pattern in patterns {
    for relative in glob_relative(root, pattern, false)? {
      let path = root.join(&relative);
      if !path.is_file() {
        continue;
      }
      let Ok(data) = fs::read(&path) else {
        continue;
      };
      let Ok(libraries) = elf::needed_libraries(&data) else {
        continue;
      };
      let Some(file_name) = relative.file_name() else {
        continue;
      };
      elfs.push((file_name.to_string_lossy().to_string(), libraries));
    }
  }
  Ok(elfs)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::package::Package;
  use crate::util::testutil::{Fixture, write_elf, write_tree};
  use std::cell::RefCell;

  enum Answer {
    Hit(&'static str),
    Fail,
  }

  /// An index answering from a table and recording every query.
  struct FakeIndex {
    name: &'static str,
    answers: HashMap<&'static str, Answer>,
    queries: RefCell<Vec<String>>,
  }

  impl FakeIndex {
    fn new(name: &'static str, answers: Vec<(&'static str, Answer)>) -> Self {
      Self {
        name,
        answers: answers.into_iter().collect(),
        queries: RefCell::new(Vec::new()),
      }
    }

    fn queries(&self) -> Vec<String> {
      self.queries.borrow().clone()
    }
  }

  impl PackageIndex for FakeIndex {
    fn name(&self) -> &str {
      self.name
    }

    fn search_file(&self, file: &str) -> Result<Option<String>, ResolutionError> {
      self.queries.borrow_mut().push(file.to_string());
      match self.answers.get(file) {
        Some(Answer::Hit(name)) => Ok(Some(name.to_string())),
        Some(Answer::Fail) => Err(ResolutionError::Ambiguous {
          repository: self.name.to_string(),
          file: file.to_string(),
          count: 2,
        }),
        None => Ok(None),
      }
    }
  }

  fn packages(pairs: Vec<Package>) -> Packages {
    pairs.into_iter().map(|p| (p.id().short_name(), p)).collect()
  }

  #[test]
  fn local_match_is_pinned_and_never_queried_remotely() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.2.0");
    let bin = Package::new(&build, "hello").unwrap();
    let lib = Package::new(&build, "libhello").unwrap();
    write_elf(&bin.wrap_cache().join("usr/bin/hello"), &["libhello.so.1", "libc.so.6"]);
    write_elf(&lib.wrap_cache().join("usr/lib64/libhello.so.1"), &["libc.so.6"]);
    let mut packages = packages(vec![bin, lib]);
    let index = FakeIndex::new("stable", vec![("libc.so.6", Answer::Hit("stable::sys-libs/glibc"))]);

    let report = elf_deplink(&mut packages, &DeplinkOptions::default(), &[&index]).unwrap();

    let hello = packages["sys-apps/hello"].dependencies();
    assert_eq!(hello["stable::sys-apps/libhello"], "=1.2.0");
    assert_eq!(hello["stable::sys-libs/glibc"], "*");
    assert_eq!(
      packages["sys-apps/libhello"].dependencies()["stable::sys-libs/glibc"],
      "*"
    );
    assert!(!index.queries().contains(&"libhello.so.1".to_string()));
    assert!(report.unresolved.is_empty());
    assert_eq!(report.resolved.len(), 3);
    assert!(
      report
        .resolved
        .iter()
        .any(|r| r.library == "libhello.so.1" && r.provider == Provider::Local)
    );
  }

  #[test]
  fn unresolved_is_reported_and_leaves_package_untouched() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    let bin = Package::new(&build, "hello").unwrap();
    write_elf(&bin.wrap_cache().join("usr/bin/hello"), &["libmissing.so.3"]);
    let mut packages = packages(vec![bin]);
    let index = FakeIndex::new("stable", vec![]);

    let report = elf_deplink(&mut packages, &DeplinkOptions::default(), &[&index]).unwrap();

    assert!(packages["sys-apps/hello"].dependencies().is_empty());
    assert_eq!(
      report.unresolved,
      vec![UnresolvedDependency {
        package: "sys-apps/hello".to_string(),
        library: "libmissing.so.3".to_string(),
      }]
    );
    assert_eq!(index.queries(), vec!["libmissing.so.3"]);
  }

  #[test]
  fn duplicate_binary_is_fatal_before_any_change() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    let a = Package::new(&build, "a").unwrap();
    let b = Package::new(&build, "b").unwrap();
    let c = Package::new(&build, "c").unwrap();
    write_elf(&a.wrap_cache().join("usr/lib64/libshared.so"), &[]);
    write_elf(&b.wrap_cache().join("usr/bin/tool"), &["libshared.so"]);
    write_elf(&c.wrap_cache().join("usr/bin/tool"), &[]);
    let mut packages = packages(vec![a, b, c]);

    let err = elf_deplink(&mut packages, &DeplinkOptions::default(), &[]).unwrap_err();

    match err {
      DeplinkError::DuplicateBinary { file, first, second } => {
        assert_eq!(file, "tool");
        assert_eq!(first, "sys-apps/b#1.0.0");
        assert_eq!(second, "sys-apps/c#1.0.0");
      }
      other => panic!("expected duplicate binary, got {other:?}"),
    }
    assert!(packages.values().all(|p| p.dependencies().is_empty()));
  }

  #[test]
  fn repositories_are_tried_in_order() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    let bin = Package::new(&build, "hello").unwrap();
    write_elf(&bin.wrap_cache().join("bin/hello"), &["libz.so.1"]);
    let mut packages = packages(vec![bin]);
    let broken = FakeIndex::new("broken", vec![("libz.so.1", Answer::Fail)]);
    let empty = FakeIndex::new("empty", vec![]);
    let good = FakeIndex::new("good", vec![("libz.so.1", Answer::Hit("good::sys-libs/zlib"))]);
    let never = FakeIndex::new("never", vec![("libz.so.1", Answer::Hit("never::sys-libs/zlib"))]);

    let report = elf_deplink(
      &mut packages,
      &DeplinkOptions::default(),
      &[&broken, &empty, &good, &never],
    )
    .unwrap();

    assert_eq!(
      packages["sys-apps/hello"].dependencies()["good::sys-libs/zlib"],
      "*"
    );
    assert!(never.queries().is_empty());
    assert_eq!(
      report.resolved[0].provider,
      Provider::Remote {
        repository: "good".to_string()
      }
    );
  }

  #[test]
  fn non_elf_files_and_self_dependencies_are_ignored() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    let package = Package::new(&build, "hello").unwrap();
    write_tree(package.wrap_cache(), &["usr/bin/script", "usr/lib64/README"]);
    write_elf(&package.wrap_cache().join("usr/bin/hello"), &["libhello.so.1"]);
    write_elf(&package.wrap_cache().join("usr/lib64/libhello.so.1"), &[]);
    let mut packages = packages(vec![package]);
    let index = FakeIndex::new("stable", vec![]);

    let report = elf_deplink(&mut packages, &DeplinkOptions::default(), &[&index]).unwrap();

    assert!(packages["sys-apps/hello"].dependencies().is_empty());
    assert!(report.resolved.is_empty());
    assert!(report.unresolved.is_empty());
    assert!(index.queries().is_empty());
  }

  #[test]
  fn resolution_modes_can_be_disabled() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    let bin = Package::new(&build, "hello").unwrap();
    let lib = Package::new(&build, "libhello").unwrap();
    write_elf(&bin.wrap_cache().join("usr/bin/hello"), &["libhello.so.1"]);
    write_elf(&lib.wrap_cache().join("usr/lib64/libhello.so.1"), &[]);
    let mut packages = packages(vec![bin, lib]);
    let index = FakeIndex::new("stable", vec![("libhello.so.1", Answer::Hit("stable::sys-libs/other"))]);

    let options = DeplinkOptions {
      local_resolving: false,
      ..DeplinkOptions::default()
    };
    elf_deplink(&mut packages, &options, &[&index]).unwrap();
    assert_eq!(
      packages["sys-apps/hello"].dependencies()["stable::sys-libs/other"],
      "*"
    );

    let options = DeplinkOptions {
      local_resolving: false,
      remote_resolving: false,
      ..DeplinkOptions::default()
    };
    let report = elf_deplink(&mut packages, &options, &[&index]).unwrap();
    assert_eq!(report.unresolved.len(), 1);
  }

  #[test]
  fn existing_requirements_are_kept() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    let mut bin = Package::new(&build, "hello").unwrap();
    let lib = Package::new(&build, "libhello").unwrap();
    bin.add_dependency("stable::sys-apps/libhello", ">=0.9.0");
    write_elf(&bin.wrap_cache().join("usr/bin/hello"), &["libhello.so.1"]);
    write_elf(&lib.wrap_cache().join("usr/lib64/libhello.so.1"), &[]);
    let mut packages = packages(vec![bin, lib]);

    elf_deplink(&mut packages, &DeplinkOptions::default(), &[]).unwrap();

    assert_eq!(
      packages["sys-apps/hello"].dependencies()["stable::sys-apps/libhello"],
      ">=0.9.0"
    );
  }
}
