//! Turning a staged package into its `.nest` archive.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::PathBuf;

use chrono::Utc;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};
use walkdir::WalkDir;

use super::{Package, PackageError};
use crate::consts::{DATA_ARCHIVE, INSTRUCTIONS_FILE, MANIFEST_FILE};
use crate::manifest::{Kind, License};

/// Contents of `manifest.toml` inside a package archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
  pub name: String,
  pub category: String,
  pub version: String,
  pub kind: Kind,
  pub wrap_date: String,
  pub metadata: PackageManifestMetadata,
  pub dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifestMetadata {
  pub description: String,
  pub tags: Vec<String>,
  pub maintainer: String,
  pub licenses: Vec<License>,
  pub upstream_url: String,
}

impl Package {
  /// Archive the package into `<name>-<version>.nest` in its package cache.
  ///
  /// Effective packages carry their staging tree as `data.tar.gz`, virtual
  /// ones only a manifest. The loose files are removed once the archive is
  /// written. Returns the archive path.
  pub fn wrap(self) -> Result<PathBuf, PackageError> {
    let span = info_span!("wrap", package = %self.id);
    let _guard = span.enter();

    let manifest = self.manifest();
    info!(
      name = %manifest.name,
      category = %manifest.category,
      version = %manifest.version,
      kind = %manifest.kind,
      wrap_date = %manifest.wrap_date,
      dependencies = manifest.dependencies.len(),
      "wrapping package"
    );
    for (dependency, req) in &manifest.dependencies {
      debug!(dependency = %dependency, req = %req, "runtime dependency");
    }

    fs::create_dir_all(&self.package_cache)?;
    let mut members = Vec::new();

    match self.kind {
      Kind::Effective => {
        let files = self.log_files();
        info!(files, "archiving staging tree");
        self.write_data_archive()?;
        members.push(DATA_ARCHIVE);
      }
      Kind::Virtual => info!("package is virtual, no data is wrapped"),
    }

    let manifest_path = self.package_cache.join(MANIFEST_FILE);
    fs::write(&manifest_path, toml::to_string(&manifest)?)?;
    members.insert(0, MANIFEST_FILE);

    if let Some(instructions) = &self.instructions {
      fs::write(self.package_cache.join(INSTRUCTIONS_FILE), instructions)?;
      members.push(INSTRUCTIONS_FILE);
    }

    let archive_path = self.archive_path();
    let mut archive = tar::Builder::new(File::create(&archive_path)?);
    for member in &members {
      archive.append_path_with_name(self.package_cache.join(member), member)?;
    }
    archive.into_inner()?;

    for member in &members {
      fs::remove_file(self.package_cache.join(member))?;
    }

    info!(archive = %archive_path.display(), "package wrapped");
    Ok(archive_path)
  }

  /// The manifest [`Package::wrap`] writes, stamped now.
  pub fn manifest(&self) -> PackageManifest {
    PackageManifest {
      name: self.id.name.clone(),
      category: self.id.category.clone(),
      version: self.id.version.to_string(),
      kind: self.kind,
      wrap_date: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
      metadata: PackageManifestMetadata {
        description: self.description.clone(),
        tags: self.tags.clone(),
        maintainer: self.maintainer.clone(),
        licenses: self.licenses.clone(),
        upstream_url: self.upstream_url.clone(),
      },
      dependencies: self.run_dependencies.clone(),
    }
  }

  fn write_data_archive(&self) -> Result<(), PackageError> {
    let file = File::create(self.package_cache.join(DATA_ARCHIVE))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder.append_dir_all(".", &self.wrap_cache)?;
    builder.into_inner()?.finish()?;
    Ok(())
  }

  fn log_files(&self) -> usize {
    let mut count = 0;
    for entry in WalkDir::new(&self.wrap_cache)
      .min_depth(1)
      .sort_by_file_name()
      .into_iter()
      .filter_map(Result::ok)
    {
      if entry.file_type().is_dir() {
        continue;
      }
      if let Ok(relative) = entry.path().strip_prefix(&self.wrap_cache) {
        debug!(file = %relative.display(), "added");
      }
      count += 1;
    }
    count
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{Fixture, write_tree};
  use flate2::read::GzDecoder;
  use std::io::Read;
  use std::os::unix::fs::PermissionsExt;
  use std::path::Path;

  fn outer_members(archive: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut members = BTreeMap::new();
    let mut tar = tar::Archive::new(File::open(archive).unwrap());
    for entry in tar.entries().unwrap() {
      let mut entry = entry.unwrap();
      let name = entry.path().unwrap().to_string_lossy().to_string();
      let mut data = Vec::new();
      entry.read_to_end(&mut data).unwrap();
      members.insert(name, data);
    }
    members
  }

  /// Path, mode and symlink target of every non-directory entry of `data.tar.gz`.
  fn data_entries(data: &[u8]) -> BTreeMap<String, (u32, Option<PathBuf>)> {
    let mut entries = BTreeMap::new();
    let mut tar = tar::Archive::new(GzDecoder::new(data));
    for entry in tar.entries().unwrap() {
      let entry = entry.unwrap();
      if entry.header().entry_type().is_dir() {
        continue;
      }
      let path = entry.path().unwrap();
      let path = path.strip_prefix(".").unwrap_or(path.as_ref()).to_string_lossy().to_string();
      let mode = entry.header().mode().unwrap();
      let link = entry.link_name().unwrap().map(|l| l.to_path_buf());
      entries.insert(path, (mode, link));
    }
    entries
  }

  #[test]
  fn effective_package_round_trip() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("4.5.0");
    write_tree(build.install_cache(), &["usr/bin/hello", "usr/share/hello/data.txt"]);
    let tool = build.install_cache().join("usr/bin/hello");
    fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

    let mut package = Package::new(&build, "hello").unwrap();
    package.drain(&["*"]).unwrap();
    package.make_symlink("hello", "usr/bin/hi").unwrap();
    package.requires("sys-libs/glibc#*").unwrap();
    let package_cache = package.package_cache().to_path_buf();

    let archive = package.wrap().unwrap();

    assert_eq!(archive, package_cache.join("hello-4.5.0.nest"));
    let members = outer_members(&archive);
    assert_eq!(
      members.keys().cloned().collect::<Vec<_>>(),
      vec![DATA_ARCHIVE.to_string(), MANIFEST_FILE.to_string()]
    );

    let entries = data_entries(&members[DATA_ARCHIVE]);
    assert_eq!(
      entries.keys().cloned().collect::<Vec<_>>(),
      vec!["usr/bin/hello", "usr/bin/hi", "usr/share/hello/data.txt"]
    );
    assert_eq!(entries["usr/bin/hello"].0 & 0o111, 0o111);
    assert_eq!(entries["usr/share/hello/data.txt"].0 & 0o111, 0);
    assert_eq!(entries["usr/bin/hi"].1, Some(PathBuf::from("hello")));

    let manifest: PackageManifest = toml::from_str(std::str::from_utf8(&members[MANIFEST_FILE]).unwrap()).unwrap();
    assert_eq!(manifest.name, "hello");
    assert_eq!(manifest.category, "sys-apps");
    assert_eq!(manifest.version, "4.5.0");
    assert_eq!(manifest.kind, Kind::Effective);
    assert_eq!(manifest.metadata.description, "Hello world.");
    assert_eq!(manifest.dependencies["stable::sys-libs/glibc"], "*");
    assert!(manifest.wrap_date.ends_with('Z'));
    assert_eq!(manifest.wrap_date.len(), "2026-10-19T12:00:00Z".len());
  }

  #[test]
  fn loose_files_are_removed() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    let mut package = Package::new(&build, "hello").unwrap();
    package.set_instructions("echo done\n");
    let package_cache = package.package_cache().to_path_buf();

    package.wrap().unwrap();

    let left: Vec<_> = fs::read_dir(&package_cache)
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
      .collect();
    assert_eq!(left, vec!["hello-1.0.0.nest"]);
  }

  #[test]
  fn virtual_package_has_no_payload() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    write_tree(build.install_cache(), &["usr/bin/hello"]);
    let mut package = Package::new(&build, "hello").unwrap();
    package.drain(&["*"]).unwrap();
    package.kind = Kind::Virtual;

    let archive = package.wrap().unwrap();

    let members = outer_members(&archive);
    assert_eq!(members.keys().cloned().collect::<Vec<_>>(), vec![MANIFEST_FILE.to_string()]);
    let manifest = std::str::from_utf8(&members[MANIFEST_FILE]).unwrap();
    assert!(manifest.contains("kind = \"virtual\""));
  }

  #[test]
  fn instructions_are_bundled() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    let mut package = Package::new(&build, "hello").unwrap();
    package.set_instructions("ldconfig\n");

    let archive = package.wrap().unwrap();

    let members = outer_members(&archive);
    assert_eq!(members[INSTRUCTIONS_FILE], b"ldconfig\n");
  }

  #[test]
  fn manifest_field_order() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    let package = Package::new(&build, "hello").unwrap();

    let text = toml::to_string(&package.manifest()).unwrap();
    let positions: Vec<usize> = ["name =", "category =", "version =", "kind =", "wrap_date =", "[metadata]"]
      .iter()
      .map(|key| text.find(key).unwrap())
      .collect();
    let mut sorted = positions.clone();
    sorted.sort();
    assert_eq!(positions, sorted);
  }
}
