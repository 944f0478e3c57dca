//! Filesystem helpers for staging trees.
//!
//! Every move performed by a package goes through [`merge_move`], which merges
//! directories of the same name instead of nesting one inside the other, and
//! falls back to copy-then-delete when a rename crosses filesystems.

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

/// Delete `path` if present, then create it empty.
pub fn recreate_dir(path: &Path) -> io::Result<()> {
  if path.symlink_metadata().is_ok() {
    remove_any(path)?;
  }
  fs::create_dir_all(path)
}

/// Remove a file, symlink or directory tree.
pub fn remove_any(path: &Path) -> io::Result<()> {
  let meta = path.symlink_metadata()?;
  if meta.is_dir() {
    fs::remove_dir_all(path)
  } else {
    fs::remove_file(path)
  }
}

/// Move `src` to `dst`, merging into `dst` when both are directories.
///
/// Existing files at the destination are replaced. Parent directories of
/// `dst` are created as needed.
pub fn merge_move(src: &Path, dst: &Path) -> io::Result<()> {
  let src_meta = src.symlink_metadata()?;

  if src_meta.is_dir() {
    if let Ok(dst_meta) = dst.symlink_metadata() {
      if dst_meta.is_dir() {
        for entry in fs::read_dir(src)? {
          let entry = entry?;
          merge_move(&entry.path(), &dst.join(entry.file_name()))?;
        }
        return fs::remove_dir(src);
      }
      remove_any(dst)?;
    }
  } else if let Ok(dst_meta) = dst.symlink_metadata() {
    if dst_meta.is_dir() {
      fs::remove_dir_all(dst)?;
    } else {
      fs::remove_file(dst)?;
    }
  }

  if let Some(parent) = dst.parent() {
    fs::create_dir_all(parent)?;
  }

  match fs::rename(src, dst) {
    Ok(()) => Ok(()),
    Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
      copy_tree(src, dst)?;
      remove_any(src)
    }
    Err(err) => Err(err),
  }
}

/// Recursively copy `src` to `dst`, recreating symlinks instead of following them.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
  for entry in WalkDir::new(src).follow_links(false) {
    let entry = entry.map_err(io::Error::other)?;
    let relative = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    let target = if relative.as_os_str().is_empty() {
      dst.to_path_buf()
    } else {
      dst.join(relative)
    };

    let file_type = entry.file_type();
    if file_type.is_dir() {
      fs::create_dir_all(&target)?;
    } else if file_type.is_symlink() {
      if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
      }
      let link = fs::read_link(entry.path())?;
      std::os::unix::fs::symlink(link, &target)?;
    } else {
      if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
      }
      fs::copy(entry.path(), &target)?;
    }
  }
  Ok(())
}

/// True if at least one non-directory entry exists below `dir`.
pub fn contains_files(dir: &Path) -> bool {
  WalkDir::new(dir)
    .follow_links(false)
    .into_iter()
    .filter_map(Result::ok)
    .any(|entry| !entry.file_type().is_dir())
}

/// Total size in bytes of all regular files below `path`.
pub fn tree_size(path: &Path) -> u64 {
  WalkDir::new(path)
    .follow_links(false)
    .into_iter()
    .filter_map(Result::ok)
    .filter(|entry| entry.file_type().is_file())
    .filter_map(|entry| entry.metadata().ok())
    .map(|meta| meta.len())
    .sum()
}
