//! Applying `*.patch` files with GNU `patch`.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::build::cmd::shell_quote;
use crate::build::{Build, BuildError};

/// Apply `patch` to the sources in the build's working directory.
///
/// Patches that appear to be already applied are skipped by `patch -N`.
pub fn apply_patch(build: &Build<'_>, patch: &Path) -> Result<(), BuildError> {
  build.cmd(&format!("patch -Np1 -i {}", shell_quote(&patch.to_string_lossy())))?;
  info!(patch = %patch.display(), "applied patch");
  Ok(())
}

/// Apply every `*.patch` file of the working directory, in name order.
pub fn patch_all(build: &Build<'_>) -> Result<Vec<PathBuf>, BuildError> {
  let mut patches: Vec<PathBuf> = fs::read_dir(build.cwd())?
    .filter_map(Result::ok)
    .map(|entry| entry.path())
    .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "patch"))
    .collect();
  patches.sort();

  for patch in &patches {
    apply_patch(build, patch)?;
  }
  Ok(patches)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::Fixture;

  const PATCH_B: &str = "--- a/hello.txt\n+++ b/hello.txt\n@@ -1 +1 @@\n-hello\n+hello patched\n";

  fn has_patch_tool() -> bool {
    std::process::Command::new("patch")
      .arg("--version")
      .output()
      .is_ok_and(|o| o.status.success())
  }

  #[test]
  fn applies_patches_in_order() {
    if !has_patch_tool() {
      return;
    }
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    fs::write(build.cwd().join("hello.txt"), "hello\n").unwrap();
    fs::write(build.cwd().join("10-second.patch"), "--- a/hello.txt\n+++ b/hello.txt\n@@ -1 +1 @@\n-hello patched\n+hello twice\n").unwrap();
    fs::write(build.cwd().join("01-first.patch"), PATCH_B).unwrap();

    let applied = patch_all(&build).unwrap();

    assert_eq!(
      applied,
      vec![build.cwd().join("01-first.patch"), build.cwd().join("10-second.patch")]
    );
    assert_eq!(fs::read_to_string(build.cwd().join("hello.txt")).unwrap(), "hello twice\n");
  }

  #[test]
  fn failing_patch_is_an_error() {
    if !has_patch_tool() {
      return;
    }
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    fs::write(build.cwd().join("hello.txt"), "something else\n").unwrap();
    fs::write(build.cwd().join("fix.patch"), PATCH_B).unwrap();

    let err = patch_all(&build).unwrap_err();
    assert!(matches!(err, BuildError::Cmd(_)));
  }

  #[test]
  fn nothing_to_apply() {
    let fixture = Fixture::new();
    let build = fixture.prepared_build("1.0.0");
    fs::write(build.cwd().join("notes.txt"), "").unwrap();

    assert!(patch_all(&build).unwrap().is_empty());
  }
}
