//! Cache layout, purging and the process-level cache lock.

pub mod lock;
pub mod paths;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::util::fs::{remove_any, tree_size};

pub use lock::{CacheLock, CacheLockError};
pub use paths::CacheRoots;

#[derive(Debug, Error)]
pub enum PurgeError {
  #[error("failed to read cache directory {path}: {source}")]
  ReadCache {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Default, Serialize)]
pub struct PurgeStats {
  pub entries_deleted: usize,
  pub bytes_freed: u64,
}

#[derive(Debug, Serialize)]
pub struct PurgeResult {
  pub stats: PurgeStats,
  pub deleted_paths: Vec<PathBuf>,
}

/// Remove every cache (download, build, install, wrap) below `cache_root`.
///
/// The lock file is left alone so a caller holding the lock keeps it. With
/// `dry_run`, nothing is deleted but the result reports what would be.
pub fn purge(cache_root: &Path, dry_run: bool) -> Result<PurgeResult, PurgeError> {
  let mut stats = PurgeStats::default();
  let mut deleted_paths = Vec::new();

  if !cache_root.exists() {
    debug!(path = %cache_root.display(), "cache directory does not exist, nothing to purge");
    return Ok(PurgeResult { stats, deleted_paths });
  }

  let entries = fs::read_dir(cache_root).map_err(|source| PurgeError::ReadCache {
    path: cache_root.to_path_buf(),
    source,
  })?;

  let mut paths: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
  paths.sort();

  for path in paths {
    if path.file_name().is_some_and(|name| name == lock::LOCK_FILENAME) {
      continue;
    }

    let size = tree_size(&path);
    if !dry_run && let Err(e) = remove_any(&path) {
      warn!(path = %path.display(), error = %e, "failed to delete cache entry");
      continue;
    }

    stats.entries_deleted += 1;
    stats.bytes_freed += size;
    deleted_paths.push(path);
  }

  info!(
    entries_deleted = stats.entries_deleted,
    bytes_freed = stats.bytes_freed,
    dry_run,
    "cache purge complete"
  );

  Ok(PurgeResult { stats, deleted_paths })
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn populated_cache() -> TempDir {
    let temp = TempDir::new().unwrap();
    for kind in ["download", "build", "install", "wrap"] {
      let dir = temp.path().join(kind).join("sys-apps/sed/4.5.0");
      fs::create_dir_all(&dir).unwrap();
      fs::write(dir.join("file"), "12345").unwrap();
    }
    fs::write(temp.path().join(lock::LOCK_FILENAME), "{}").unwrap();
    temp
  }

  #[test]
  fn purge_removes_every_cache() {
    let temp = populated_cache();

    let result = purge(temp.path(), false).unwrap();

    assert_eq!(result.stats.entries_deleted, 4);
    assert_eq!(result.stats.bytes_freed, 20);
    for kind in ["download", "build", "install", "wrap"] {
      assert!(!temp.path().join(kind).exists());
    }
    assert!(temp.path().join(lock::LOCK_FILENAME).exists());
  }

  #[test]
  fn purge_dry_run_keeps_files() {
    let temp = populated_cache();

    let result = purge(temp.path(), true).unwrap();

    assert_eq!(result.stats.entries_deleted, 4);
    assert!(temp.path().join("download").exists());
  }

  #[test]
  fn purge_missing_root_is_noop() {
    let temp = TempDir::new().unwrap();
    let result = purge(&temp.path().join("absent"), false).unwrap();
    assert_eq!(result.stats.entries_deleted, 0);
  }
}
