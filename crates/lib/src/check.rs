//! Sanity checks run on packages before they are wrapped.
//!
//! Everything directly inside a `*bin` directory and every shared object
//! (`*.so*`) directly inside a `lib`, `lib32` or `lib64` directory should be
//! executable. Mismatches are reported as warnings and never stop a build.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::package::Package;

/// Check the executable bits of `package`, logging a warning per file.
///
/// Returns the offending files, relative to the package's staging tree.
pub fn check_executables(package: &Package) -> Vec<PathBuf> {
  let root = package.wrap_cache();
  let mut issues = Vec::new();

  for entry in WalkDir::new(root).min_depth(2).follow_links(false).sort_by_file_name() {
    let Ok(entry) = entry else { continue };
    if !entry.file_type().is_file() {
      continue;
    }
    let Some(parent) = entry.path().parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()) else {
      continue;
    };
    let file_name = entry.file_name().to_string_lossy();

    let should_be_executable = parent.ends_with("bin") || (is_lib_dir(parent) && file_name.contains(".so"));
    if !should_be_executable {
      continue;
    }

    let executable = entry
      .metadata()
      .map(|m| m.permissions().mode() & 0o111 != 0)
      .unwrap_or(false);
    if !executable {
      let path = entry.path().strip_prefix(root).unwrap_or(entry.path()).to_path_buf();
      warn!(package = %package.id(), path = %path.display(), "file is not executable, but should be");
      issues.push(path);
    }
  }

  if issues.is_empty() {
    debug!(package = %package.id(), "executable checks passed");
  }
  issues
}

fn is_lib_dir(name: &str) -> bool {
  matches!(name, "lib" | "lib32" | "lib64")
}
