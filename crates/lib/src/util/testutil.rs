//! Test utilities for nbuild-lib.
//!
//! Provides a throwaway configuration and manifest rooted in a temporary
//! directory, helpers to lay out and list file trees, and a writer for
//! minimal dynamically linked ELF files.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use walkdir::WalkDir;

use crate::build::{Build, BuildError};
use crate::config::Config;
use crate::manifest::{BuildManifest, Metadata, VersionArgs};
use crate::package::Packages;
use crate::util::fs::recreate_dir;

/// Configuration whose caches and outputs all live below `root`.
pub fn test_config(root: &Path) -> Config {
  Config {
    cache_dir: root.join("cache"),
    output_dir: root.join("out"),
    repository: "stable".to_string(),
    target: "x86_64-linux-gnu".to_string(),
    repositories: Vec::new(),
    verbose: false,
  }
}

/// Metadata of the `sys-apps/hello` manifest used across tests.
pub fn test_metadata() -> Metadata {
  Metadata::new("sys-apps", "hello", "Hello world.")
    .with_tags(["hello"])
    .with_maintainer("tests@example.com")
}

pub fn test_manifest<F>(instructions: F) -> BuildManifest
where
  F: Fn(&mut Build<'_>) -> Result<Packages, BuildError> + 'static,
{
  BuildManifest::new(test_metadata(), instructions)
}

/// A temporary root with a config and a manifest that does nothing.
pub struct Fixture {
  pub temp: TempDir,
  pub config: Config,
  pub manifest: BuildManifest,
}

impl Fixture {
  pub fn new() -> Self {
    Self::with_manifest(|source_dir| test_manifest(|_| Ok(Packages::new())).with_source_dir(source_dir))
  }

  /// `make` receives the manifest's source directory.
  pub fn with_manifest(make: impl FnOnce(PathBuf) -> BuildManifest) -> Self {
    let temp = TempDir::new().unwrap();
    let source_dir = temp.path().join("manifests");
    fs::create_dir_all(&source_dir).unwrap();
    let config = test_config(temp.path());
    let manifest = make(source_dir);
    Self { temp, config, manifest }
  }

  pub fn source_dir(&self) -> &Path {
    &self.manifest.source_dir
  }

  /// A build whose caches exist and are empty, as they are once `build()` starts.
  pub fn prepared_build(&self, version: &str) -> Build<'_> {
    let build = Build::new(&self.manifest, VersionArgs::new(version), &self.config).unwrap();
    recreate_dir(build.build_cache()).unwrap();
    recreate_dir(build.install_cache()).unwrap();
    fs::create_dir_all(build.download_cache()).unwrap();
    build
  }
}

/// Create files (with their path as content) and, for paths ending in `/`, directories.
pub fn write_tree(root: &Path, paths: &[&str]) {
  for path in paths {
    let full = root.join(path);
    if path.ends_with('/') {
      fs::create_dir_all(full).unwrap();
    } else {
      fs::create_dir_all(full.parent().unwrap()).unwrap();
      fs::write(full, path).unwrap();
    }
  }
}

/// Sorted relative paths of every non-directory entry below `root`.
pub fn list_tree(root: &Path) -> Vec<String> {
  let mut files: Vec<String> = WalkDir::new(root)
    .follow_links(false)
    .into_iter()
    .filter_map(Result::ok)
    .filter(|entry| !entry.file_type().is_dir())
    .map(|entry| {
      entry
        .path()
        .strip_prefix(root)
        .unwrap()
        .to_string_lossy()
        .to_string()
    })
    .collect();
  files.sort();
  files
}

/// Write an executable ELF file with one `DT_NEEDED` entry per name.
pub fn write_elf(path: &Path, needed: &[&str]) {
  fs::create_dir_all(path.parent().unwrap()).unwrap();
  fs::write(path, build_elf(true, true, needed)).unwrap();
}

/// A minimal ELF image: header, `.dynstr`, `.dynamic` and three section headers.
pub fn build_elf(class64: bool, little_endian: bool, needed: &[&str]) -> Vec<u8> {
  let put = |buf: &mut Vec<u8>, value: u64, width: usize| {
    let bytes = value.to_le_bytes();
    let field = &bytes[..width];
    if little_endian {
      buf.extend_from_slice(field);
    } else {
      buf.extend(field.iter().rev());
    }
  };
  let word = if class64 { 8 } else { 4 };
  let ehsize: u64 = if class64 { 64 } else { 52 };
  let shentsize: u64 = if class64 { 64 } else { 40 };
  let dynentsize = 2 * word as u64;

  let mut dynstr = vec![0u8];
  let mut offsets = Vec::new();
  for name in needed {
    offsets.push(dynstr.len() as u64);
    dynstr.extend_from_slice(name.as_bytes());
    dynstr.push(0);
  }

  let dynstr_off = ehsize;
  let dynamic_off = dynstr_off + dynstr.len() as u64;
  let dynamic_size = dynentsize * (needed.len() as u64 + 1);
  let shoff = dynamic_off + dynamic_size;

  let mut buf = Vec::new();
  buf.extend_from_slice(&[0x7f, b'E', b'L', b'F']);
  buf.push(if class64 { 2 } else { 1 });
  buf.push(if little_endian { 1 } else { 2 });
  buf.push(1);
  buf.extend_from_slice(&[0; 9]);
  put(&mut buf, 3, 2); // ET_DYN
  put(&mut buf, 0x3e, 2);
  put(&mut buf, 1, 4);
  put(&mut buf, 0, word); // entry
  put(&mut buf, 0, word); // phoff
  put(&mut buf, shoff, word);
  put(&mut buf, 0, 4);
  put(&mut buf, ehsize, 2);
  put(&mut buf, 0, 2);
  put(&mut buf, 0, 2);
  put(&mut buf, shentsize, 2);
  put(&mut buf, 3, 2);
  put(&mut buf, 0, 2);
  assert_eq!(buf.len() as u64, ehsize);

  buf.extend_from_slice(&dynstr);
  for offset in &offsets {
    put(&mut buf, 1, word); // DT_NEEDED
    put(&mut buf, *offset, word);
  }
  put(&mut buf, 0, word); // DT_NULL
  put(&mut buf, 0, word);

  let section = |buf: &mut Vec<u8>, kind: u64, offset: u64, size: u64, link: u64, entsize: u64| {
    put(buf, 0, 4); // name
    put(buf, kind, 4);
    put(buf, 0, word); // flags
    put(buf, 0, word); // addr
    put(buf, offset, word);
    put(buf, size, word);
    put(buf, link, 4);
    put(buf, 0, 4); // info
    put(buf, 1, word); // addralign
    put(buf, entsize, word);
  };
  section(&mut buf, 0, 0, 0, 0, 0);
  section(&mut buf, 3, dynstr_off, dynstr.len() as u64, 0, 0);
  section(&mut buf, 6, dynamic_off, dynamic_size, 1, dynentsize);

  buf
}
