//! Exclusive lock on a cache root.
//!
//! Builds wipe and recreate caches, so two nbuild processes must never share a
//! cache root. The lock is an advisory `flock` held for the lifetime of
//! [`CacheLock`], with JSON metadata describing the holder.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub(crate) const LOCK_FILENAME: &str = ".lock";

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub cache: PathBuf,
}

#[derive(Debug, Error)]
pub enum CacheLockError {
  #[error(
    "Cache is locked by another process: {command} (PID {pid}, started at Unix timestamp {started_at_unix})\n\
     If you're sure no nbuild process is running, remove the lock file:\n  {lock_path}"
  )]
  Contention {
    command: String,
    pid: u32,
    started_at_unix: u64,
    lock_path: PathBuf,
  },

  #[error(
    "Cache is locked (could not read lock metadata)\n\
     If you're sure no nbuild process is running, remove the lock file:\n  {lock_path}"
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("Failed to create cache directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("Failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("Failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("Failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

pub struct CacheLock {
  file: File,
  lock_path: PathBuf,
}

impl CacheLock {
  /// Take the exclusive lock on `cache_root`, creating the directory if needed.
  ///
  /// Fails immediately with [`CacheLockError::Contention`] when another process
  /// holds it.
  pub fn acquire(cache_root: &Path, command: &str) -> Result<Self, CacheLockError> {
    let lock_path = cache_root.join(LOCK_FILENAME);

    std::fs::create_dir_all(cache_root).map_err(CacheLockError::CreateDir)?;

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(CacheLockError::OpenFile)?;

    if let Err(err) = try_lock_exclusive(&file) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(read_contention_error(&lock_path));
      }
      return Err(CacheLockError::LockFailed(err));
    }

    write_metadata(&file, command, cache_root)?;
    debug!(path = %lock_path.display(), command, "acquired cache lock");

    Ok(CacheLock { file, lock_path })
  }

  /// Reads the lock metadata through the held handle.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

fn write_metadata(file: &File, command: &str, cache_root: &Path) -> Result<(), CacheLockError> {
  let metadata = LockMetadata {
    version: 1,
    pid: std::process::id(),
    started_at_unix: SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs(),
    command: command.to_string(),
    cache: cache_root.to_path_buf(),
  };

  file.set_len(0).map_err(CacheLockError::WriteMetadata)?;
  let mut writer = io::BufWriter::new(file);
  serde_json::to_writer_pretty(&mut writer, &metadata)
    .map_err(|e| CacheLockError::WriteMetadata(io::Error::other(e)))?;
  writer.flush().map_err(CacheLockError::WriteMetadata)?;

  Ok(())
}

fn read_contention_error(lock_path: &Path) -> CacheLockError {
  let metadata = std::fs::read_to_string(lock_path)
    .ok()
    .and_then(|contents| serde_json::from_str::<LockMetadata>(&contents).ok());

  match metadata {
    Some(metadata) => CacheLockError::Contention {
      command: metadata.command,
      pid: metadata.pid,
      started_at_unix: metadata.started_at_unix,
      lock_path: lock_path.to_path_buf(),
    },
    None => CacheLockError::ContentionUnknown {
      lock_path: lock_path.to_path_buf(),
    },
  }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
    .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn acquire_creates_lock_file() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("cache");

    let lock = CacheLock::acquire(&root, "build").unwrap();

    assert!(lock.lock_path().exists());
    assert_eq!(lock.lock_path(), root.join(LOCK_FILENAME));
  }

  #[test]
  fn lock_metadata_written() {
    let temp = TempDir::new().unwrap();

    let lock = CacheLock::acquire(temp.path(), "purge").unwrap();
    let metadata = lock.read_metadata().unwrap();

    assert_eq!(metadata.version, 1);
    assert_eq!(metadata.command, "purge");
    assert_eq!(metadata.pid, std::process::id());
    assert_eq!(metadata.cache, temp.path());
  }

  #[test]
  fn second_lock_reports_contention() {
    let temp = TempDir::new().unwrap();

    let _held = CacheLock::acquire(temp.path(), "build sed").unwrap();
    let err = CacheLock::acquire(temp.path(), "build grep").err().unwrap();

    match err {
      CacheLockError::Contention { command, pid, .. } => {
        assert_eq!(command, "build sed");
        assert_eq!(pid, std::process::id());
      }
      other => panic!("expected contention, got {other:?}"),
    }
  }

  #[test]
  fn lock_released_on_drop() {
    let temp = TempDir::new().unwrap();
    {
      let _lock = CacheLock::acquire(temp.path(), "first").unwrap();
    }

    let lock = CacheLock::acquire(temp.path(), "second").unwrap();
    assert_eq!(lock.read_metadata().unwrap().command, "second");
  }
}
