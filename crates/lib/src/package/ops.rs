//! Moving content into, around and out of a package's staging tree.
//!
//! Patterns go through [`glob_relative`]: brace expansion, then globbing
//! relative to the tree being drained. Patterns matching nothing are skipped.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace, warn};

use super::{Package, PackageError};
use crate::consts::KEEPER_FILE;
use crate::pattern::glob_relative;
use crate::util::fs::{merge_move, remove_any};

impl Package {
  /// Move the matches of `patterns` from the build's install cache into this package.
  pub fn drain(&mut self, patterns: &[&str]) -> Result<usize, PackageError> {
    let install_cache = self.install_cache.clone();
    self.drain_from(&install_cache, patterns, "drain")
  }

  /// Move the matches of `patterns` from another package's staging tree into this one.
  pub fn drain_package(&mut self, source: &mut Package, patterns: &[&str]) -> Result<usize, PackageError> {
    let source_cache = source.wrap_cache.clone();
    self.drain_from(&source_cache, patterns, "drain_package")
  }

  /// Move the matches of `src` in the build cache to `dst` inside this package.
  ///
  /// `dst` names a directory when it ends with `/` or already exists as one;
  /// matches then land inside it.
  pub fn drain_build_cache(&mut self, src: &str, dst: &str) -> Result<usize, PackageError> {
    reject_absolute("drain_build_cache", src)?;
    reject_absolute("drain_build_cache", dst)?;

    let mut moved = 0;
    for relative in glob_relative(&self.build_cache, src, self.recursive_globs)? {
      let target = move_target(&self.wrap_cache, &relative, dst);
      merge_move(&self.build_cache.join(&relative), &target)?;
      moved += 1;
    }
    debug!(package = %self.id, src, dst, moved, "drained build cache");
    Ok(moved)
  }

  /// Move the matches of `src` to `dst`, both inside this package.
  pub fn move_files(&mut self, src: &str, dst: &str) -> Result<usize, PackageError> {
    reject_absolute("move", src)?;
    reject_absolute("move", dst)?;

    let mut moved = 0;
    for relative in glob_relative(&self.wrap_cache, src, self.recursive_globs)? {
      let from = self.wrap_cache.join(&relative);
      // An earlier match may have carried this one along.
      if from.symlink_metadata().is_err() {
        continue;
      }
      let target = move_target(&self.wrap_cache, &relative, dst);
      if target == from {
        continue;
      }
      merge_move(&from, &target)?;
      moved += 1;
    }
    trace!(package = %self.id, src, dst, moved, "moved files");
    Ok(moved)
  }

  /// Delete the matches of `patterns` inside this package.
  pub fn remove(&mut self, patterns: &[&str]) -> Result<usize, PackageError> {
    let mut removed = 0;
    for pattern in patterns {
      reject_absolute("remove", pattern)?;
      for relative in glob_relative(&self.wrap_cache, pattern, self.recursive_globs)? {
        let path = self.wrap_cache.join(&relative);
        if path.symlink_metadata().is_ok() {
          remove_any(&path)?;
          removed += 1;
        }
      }
    }
    debug!(package = %self.id, removed, "removed files");
    Ok(removed)
  }

  /// Create an empty hidden file in `dir` so the directory survives wrapping.
  pub fn make_keeper(&mut self, dir: &str) -> Result<(), PackageError> {
    reject_absolute("make_keeper", dir)?;
    let dir = self.wrap_cache.join(dir);
    fs::create_dir_all(&dir)?;
    fs::write(dir.join(KEEPER_FILE), b"")?;
    Ok(())
  }

  /// Create the symlink `link -> target`, `link` being relative to the staging tree.
  pub fn make_symlink(&mut self, target: &str, link: &str) -> Result<(), PackageError> {
    if Path::new(target).is_absolute() {
      warn!(package = %self.id, target, link, "absolute symlink target, prefer a relative one");
    }
    reject_absolute("make_symlink", link)?;

    let link = self.wrap_cache.join(link);
    if let Some(parent) = link.parent() {
      fs::create_dir_all(parent)?;
    }
    std::os::unix::fs::symlink(target, &link)?;
    Ok(())
  }

  fn drain_from(&mut self, source: &Path, patterns: &[&str], op: &'static str) -> Result<usize, PackageError> {
    let mut moved = 0;
    for pattern in patterns {
      reject_absolute(op, pattern)?;
      for relative in glob_relative(source, pattern, self.recursive_globs)? {
        let from = source.join(&relative);
        if from.symlink_metadata().is_err() {
          continue;
        }
        merge_move(&from, &self.wrap_cache.join(&relative))?;
        moved += 1;
      }
    }
    if moved > 0 {
      debug!(package = %self.id, op, moved, "drained files");
    }
    Ok(moved)
  }
}

fn reject_absolute(op: &'static str, path: &str) -> Result<(), PackageError> {
  if Path::new(path).is_absolute() {
    return Err(PackageError::AbsolutePath {
      op,
      path: PathBuf::from(path),
    });
  }
  Ok(())
}

/// Where a move of `relative` to `dst` lands inside `root`.
fn move_target(root: &Path, relative: &Path, dst: &str) -> PathBuf {
  let dst_path = root.join(dst);
  let into_dir = dst.ends_with('/') || dst_path.is_dir();
  match relative.file_name() {
    Some(file_name) if into_dir => dst_path.join(file_name),
    _ => dst_path,
  }
}
